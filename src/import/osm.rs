//! Reading OSM XML exports.
//!
//! Only the XML itself being broken aborts reading. Everything that is
//! wrong with an individual element causes that element to be dropped and
//! recorded in the returned error collection.

use std::mem;
use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use crate::error::Error;
use crate::feature::{Coord, ElementId, GeoFeature, Kind, Tags};
use crate::projection::BoundingBox;
use super::{OsmData, ParseErrorKind, ParseErrors};


/// Reads an OSM XML document.
pub fn read<R: BufRead>(reader: R) -> Result<OsmData, Error> {
    let mut reader = Reader::from_reader(reader);
    reader.trim_text(true);
    let mut state = ReadState::default();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(elem) => state.open(&elem),
            Event::Empty(elem) => {
                state.open(&elem);
                state.close(elem.name().as_ref());
            }
            Event::End(elem) => state.close(elem.name().as_ref()),
            Event::Eof => break,
            _ => { }
        }
        buf.clear();
    }
    Ok(state.finalize())
}

/// Reads an OSM XML document from a string.
pub fn read_str(data: &str) -> Result<OsmData, Error> {
    read(data.as_bytes())
}


//------------ ReadState -----------------------------------------------------

#[derive(Default)]
struct ReadState {
    bounds: Option<BoundingBox>,

    /// The coordinates of all well-formed nodes.
    nodes: HashMap<i64, Coord>,

    /// Tagged nodes, all ways, and multipolygon relations in order.
    elements: Vec<Element>,

    /// The index of each way in `elements`.
    ways: HashMap<i64, usize>,

    /// The element we are currently inside of.
    current: Option<Element>,

    errors: ParseErrors,
}

impl ReadState {
    fn open(&mut self, elem: &BytesStart) {
        match elem.name().as_ref() {
            b"bounds" => self.bounds = read_bounds(elem),
            b"node" => {
                let (id, mut error) = read_id(elem);
                let coord = match (
                    required::<f64>(elem, "lat"), required::<f64>(elem, "lon")
                ) {
                    (Ok(lat), Ok(lon)) => Coord::new(lat, lon),
                    (Err(err), _) | (_, Err(err)) => {
                        error.get_or_insert(err);
                        Coord::default()
                    }
                };
                if error.is_none() && !coord.is_valid() {
                    error = Some(ParseErrorKind::CoordinateRange(coord));
                }
                self.begin(ElementId::Node(id), Body::Node(coord), error);
            }
            b"way" => {
                let (id, error) = read_id(elem);
                self.begin(ElementId::Way(id), Body::Way(Vec::new()), error);
            }
            b"relation" => {
                let (id, error) = read_id(elem);
                self.begin(
                    ElementId::Relation(id), Body::Relation(Vec::new()), error
                );
            }
            b"tag" => {
                if let Some(current) = self.current.as_mut() {
                    match (attr(elem, "k"), attr(elem, "v")) {
                        (Ok(Some(key)), Ok(Some(value))) => {
                            current.tags.insert(key, value)
                        }
                        (Ok(None), _) => {
                            current.fail(ParseErrorKind::MissingAttribute("k"))
                        }
                        (_, Ok(None)) => {
                            current.fail(ParseErrorKind::MissingAttribute("v"))
                        }
                        (Err(err), _) | (_, Err(err)) => current.fail(err),
                    }
                }
            }
            b"nd" => {
                if let Some(current) = self.current.as_mut() {
                    match required::<i64>(elem, "ref") {
                        Ok(id) => {
                            if let Body::Way(ref mut refs) = current.body {
                                refs.push(id)
                            }
                        }
                        Err(err) => current.fail(err),
                    }
                }
            }
            b"member" => {
                if let Some(current) = self.current.as_mut() {
                    // Only way members contribute to area outlines.
                    if !matches!(attr(elem, "type"), Ok(Some(ref t)) if t == "way") {
                        return
                    }
                    let role = attr(elem, "role").ok().flatten();
                    match required::<i64>(elem, "ref") {
                        Ok(way) => {
                            if let Body::Relation(ref mut members) =
                                current.body
                            {
                                members.push(Member {
                                    way,
                                    outer: matches!(
                                        role.as_deref(), None | Some("outer") | Some("")
                                    ),
                                })
                            }
                        }
                        Err(err) => current.fail(err),
                    }
                }
            }
            other => {
                tracing::trace!(
                    "skipping element <{}>", String::from_utf8_lossy(other)
                );
            }
        }
    }

    fn begin(
        &mut self, id: ElementId, body: Body, error: Option<ParseErrorKind>
    ) {
        self.current = Some(Element { id, body, tags: Tags::new(), error });
    }

    fn close(&mut self, name: &[u8]) {
        if matches!(name, b"node" | b"way" | b"relation") {
            if let Some(element) = self.current.take() {
                self.finish(element)
            }
        }
    }

    fn finish(&mut self, element: Element) {
        if let Some(err) = element.error {
            self.errors.add(element.id, err);
            return
        }
        match element.body {
            Body::Node(coord) => {
                if let ElementId::Node(id) = element.id {
                    self.nodes.insert(id, coord);
                }
                if !element.tags.is_empty() {
                    self.elements.push(element)
                }
            }
            Body::Way(ref refs) => {
                if refs.is_empty() {
                    self.errors.add(
                        element.id, ParseErrorKind::TooFewPoints(0)
                    );
                    return
                }
                if let ElementId::Way(id) = element.id {
                    self.ways.insert(id, self.elements.len());
                }
                self.elements.push(element)
            }
            Body::Relation(_) => {
                if element.tags.get("type") == Some("multipolygon") {
                    self.elements.push(element)
                }
            }
        }
    }

    fn finalize(mut self) -> OsmData {
        let elements = mem::take(&mut self.elements);
        let mut features = Vec::new();
        for element in &elements {
            match element.body {
                Body::Node(coord) => {
                    match GeoFeature::point(
                        element.id, coord, element.tags.clone()
                    ) {
                        Ok(feature) => features.push(feature),
                        Err(err) => self.errors.add(element.id, err),
                    }
                }
                Body::Way(ref refs) => {
                    // Untagged ways are only there for relations.
                    if element.tags.is_empty() {
                        continue
                    }
                    let kind = if refs.len() > 2 && refs.first() == refs.last() {
                        Kind::Polygon
                    }
                    else {
                        Kind::Polyline
                    };
                    let res = resolve(refs, &self.nodes).and_then(|coords| {
                        GeoFeature::new(
                            element.id, kind, coords, element.tags.clone()
                        )
                    });
                    match res {
                        Ok(feature) => features.push(feature),
                        Err(err) => self.errors.add(element.id, err),
                    }
                }
                Body::Relation(ref members) => {
                    let res = self.relation_rings(
                        members, &elements
                    ).and_then(|rings| {
                        rings.into_iter().map(|coords| {
                            GeoFeature::new(
                                element.id, Kind::Polygon, coords,
                                element.tags.clone()
                            )
                        }).collect::<Result<Vec<_>, _>>()
                    });
                    match res {
                        Ok(polygons) => features.extend(polygons),
                        Err(err) => self.errors.add(element.id, err),
                    }
                }
            }
        }
        tracing::debug!(
            "read {} features, dropped {}", features.len(), self.errors.len()
        );
        OsmData {
            bounds: self.bounds,
            features,
            errors: self.errors,
        }
    }

    /// Stitches the outer members of a multipolygon into closed rings.
    fn relation_rings(
        &self, members: &[Member], elements: &[Element]
    ) -> Result<Vec<Vec<Coord>>, ParseErrorKind> {
        let mut parts = Vec::new();
        for member in members.iter().filter(|member| member.outer) {
            let refs = self.ways.get(&member.way).and_then(|&idx| {
                match elements[idx].body {
                    Body::Way(ref refs) => Some(refs.clone()),
                    _ => None
                }
            }).ok_or(ParseErrorKind::MissingWay(member.way))?;
            parts.push(refs);
        }
        if parts.is_empty() {
            return Err(ParseErrorKind::TooFewPoints(0))
        }
        assemble_rings(parts)?.iter().map(|ring| {
            resolve(ring, &self.nodes)
        }).collect()
    }
}


//------------ Element -------------------------------------------------------

struct Element {
    id: ElementId,
    body: Body,
    tags: Tags,
    error: Option<ParseErrorKind>,
}

impl Element {
    /// Marks the element as malformed, keeping the first error.
    fn fail(&mut self, err: ParseErrorKind) {
        self.error.get_or_insert(err);
    }
}

enum Body {
    Node(Coord),
    Way(Vec<i64>),
    Relation(Vec<Member>),
}

struct Member {
    way: i64,
    outer: bool,
}


//------------ Helper Functions ----------------------------------------------

/// Joins way node lists at shared end nodes until every ring is closed.
fn assemble_rings(
    mut parts: Vec<Vec<i64>>
) -> Result<Vec<Vec<i64>>, ParseErrorKind> {
    parts.reverse();
    let mut rings = Vec::new();
    while let Some(mut ring) = parts.pop() {
        while ring.first() != ring.last() {
            let end = match ring.last() {
                Some(end) => *end,
                None => break,
            };
            let pos = parts.iter().position(|part| {
                part.first() == Some(&end) || part.last() == Some(&end)
            }).ok_or(ParseErrorKind::OpenRing)?;
            let mut part = parts.remove(pos);
            if part.first() != Some(&end) {
                part.reverse();
            }
            ring.extend(part.into_iter().skip(1));
        }
        rings.push(ring);
    }
    Ok(rings)
}

fn resolve(
    refs: &[i64], nodes: &HashMap<i64, Coord>
) -> Result<Vec<Coord>, ParseErrorKind> {
    refs.iter().map(|id| {
        nodes.get(id).copied().ok_or(ParseErrorKind::MissingNode(*id))
    }).collect()
}

fn read_bounds(elem: &BytesStart) -> Option<BoundingBox> {
    let res = (|| {
        Ok::<_, ParseErrorKind>((
            required::<f64>(elem, "maxlat")?,
            required::<f64>(elem, "minlat")?,
            required::<f64>(elem, "maxlon")?,
            required::<f64>(elem, "minlon")?,
        ))
    })();
    match res {
        Ok((north, south, east, west)) => {
            match BoundingBox::new(north, south, east, west) {
                Ok(bounds) => Some(bounds),
                Err(err) => {
                    tracing::warn!("ignoring export bounds: {}", err);
                    None
                }
            }
        }
        Err(err) => {
            tracing::warn!("ignoring export bounds: {}", err);
            None
        }
    }
}

fn read_id(elem: &BytesStart) -> (i64, Option<ParseErrorKind>) {
    match required::<i64>(elem, "id") {
        Ok(id) => (id, None),
        Err(err) => (0, Some(err)),
    }
}

fn required<T: FromStr>(
    elem: &BytesStart, name: &'static str
) -> Result<T, ParseErrorKind> {
    let value = attr(elem, name)?.ok_or(
        ParseErrorKind::MissingAttribute(name)
    )?;
    match T::from_str(value.trim()) {
        Ok(value) => Ok(value),
        Err(_) => Err(ParseErrorKind::InvalidAttribute { attr: name, value }),
    }
}

fn attr(
    elem: &BytesStart, name: &'static str
) -> Result<Option<String>, ParseErrorKind> {
    let attr = match elem.try_get_attribute(name) {
        Ok(Some(attr)) => attr,
        Ok(None) => return Ok(None),
        Err(_) => {
            return Err(ParseErrorKind::InvalidAttribute {
                attr: name, value: String::new()
            })
        }
    };
    match attr.unescape_value() {
        Ok(value) => Ok(Some(value.into_owned())),
        Err(_) => {
            Err(ParseErrorKind::InvalidAttribute {
                attr: name,
                value: String::from_utf8_lossy(&attr.value).into_owned(),
            })
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="48.38" minlon="-4.50" maxlat="48.39" maxlon="-4.48"/>
  <node id="1" lat="48.381" lon="-4.49"/>
  <node id="2" lat="48.382" lon="-4.49"/>
  <node id="3" lat="48.382" lon="-4.488"/>
  <node id="4" lat="48.381" lon="-4.488"/>
  <node id="5" lat="48.385" lon="-4.485">
    <tag k="name" v="Place A"/>
    <tag k="place" v="square"/>
  </node>
  <node id="6" lat="not a number" lon="-4.485">
    <tag k="name" v="Broken"/>
  </node>
  <way id="10">
    <nd ref="1"/><nd ref="2"/><nd ref="3"/><nd ref="4"/><nd ref="1"/>
    <tag k="building" v="yes"/>
  </way>
  <way id="11">
    <nd ref="1"/><nd ref="3"/>
    <tag k="highway" v="primary"/>
    <tag k="name" v="Rue A"/>
  </way>
  <way id="12">
    <nd ref="1"/><nd ref="99"/>
    <tag k="highway" v="residential"/>
  </way>
  <changeset id="7"/>
</osm>"#;

    #[test]
    fn reads_features_and_drops_broken_ones() {
        let data = read_str(EXPORT).unwrap();
        assert!(data.bounds.is_some());
        let ids: Vec<_> = data.features.iter().map(|f| f.id()).collect();
        assert_eq!(
            ids,
            [ElementId::Node(5), ElementId::Way(10), ElementId::Way(11)]
        );
        assert_eq!(data.features[1].kind(), Kind::Polygon);
        assert_eq!(data.features[2].kind(), Kind::Polyline);
        assert_eq!(data.features[2].tags().get("name"), Some("Rue A"));

        let errors: Vec<_> = data.errors.iter().map(|e| e.element).collect();
        assert_eq!(errors, [ElementId::Node(6), ElementId::Way(12)]);
        assert_eq!(
            data.errors.iter().nth(1).map(|e| e.kind.clone()),
            Some(ParseErrorKind::MissingNode(99))
        );
    }

    #[test]
    fn stitches_multipolygon_rings() {
        let data = read_str(r#"<osm>
          <node id="1" lat="0.0" lon="0.0"/>
          <node id="2" lat="0.0" lon="0.01"/>
          <node id="3" lat="0.01" lon="0.01"/>
          <node id="4" lat="0.01" lon="0.0"/>
          <way id="20"><nd ref="1"/><nd ref="2"/><nd ref="3"/></way>
          <way id="21"><nd ref="1"/><nd ref="4"/><nd ref="3"/></way>
          <relation id="30">
            <member type="way" ref="20" role="outer"/>
            <member type="way" ref="21" role="outer"/>
            <member type="node" ref="1" role="label"/>
            <tag k="type" v="multipolygon"/>
            <tag k="natural" v="water"/>
          </relation>
        </osm>"#).unwrap();
        assert!(data.errors.is_empty());
        assert_eq!(data.features.len(), 1);
        let lake = &data.features[0];
        assert_eq!(lake.id(), ElementId::Relation(30));
        assert_eq!(lake.kind(), Kind::Polygon);
        assert_eq!(lake.coords().len(), 5);
        assert_eq!(lake.coords().first(), lake.coords().last());
    }

    #[test]
    fn open_multipolygon_is_dropped() {
        let data = read_str(r#"<osm>
          <node id="1" lat="0.0" lon="0.0"/>
          <node id="2" lat="0.0" lon="0.01"/>
          <way id="20"><nd ref="1"/><nd ref="2"/></way>
          <relation id="30">
            <member type="way" ref="20" role="outer"/>
            <tag k="type" v="multipolygon"/>
          </relation>
        </osm>"#).unwrap();
        assert!(data.features.is_empty());
        assert_eq!(
            data.errors.iter().next().map(|e| e.kind.clone()),
            Some(ParseErrorKind::OpenRing)
        );
    }

    #[test]
    fn broken_xml_fails() {
        assert!(read_str("<osm><node id=\"1\"></osm>").is_err());
    }
}
