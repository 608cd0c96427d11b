// src/selections/xml.rs

//! Canonical XML form of a [`Selections`] document.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <selections interface="http://example.com/app">
//!   <selection interface="http://example.com/app" id="sha256=..." version="1.0" main="bin/app">
//!     <environment name="PATH" insert="bin"/>
//!     <requires interface="http://example.com/lib">
//!       <environment name="LIBDIR" insert="lib" mode="replace"/>
//!     </requires>
//!     <archive href="http://example.com/app-1.0.tgz"/>
//!   </selection>
//!   ...
//! </selections>
//! ```
//!
//! Selections are written sorted by interface URI, so the same document
//! always serializes to the same bytes.

use std::fmt::Display;

use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::trace;

use crate::errors::{LaunchError, Result};
use crate::selections::binding::{
    Binding, BindingMode, BindingSource, EnvironmentBinding, DEFAULT_SEPARATOR,
};
use crate::selections::model::{Dependency, Selection, Selections};

fn xml_error(err: impl Display) -> LaunchError {
    LaunchError::Selections(format!("XML error: {err}"))
}

/// Serialize `sels` to canonical UTF-8 XML.
pub fn to_xml(sels: &Selections) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;

    let mut root = BytesStart::new("selections");
    root.push_attribute(("interface", sels.interface.as_str()));
    writer.write_event(Event::Start(root)).map_err(xml_error)?;

    for sel in sels.iter() {
        write_selection(&mut writer, sel)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("selections")))
        .map_err(xml_error)?;

    String::from_utf8(writer.into_inner()).map_err(xml_error)
}

fn write_selection(writer: &mut Writer<Vec<u8>>, sel: &Selection) -> Result<()> {
    let mut start = BytesStart::new("selection");
    start.push_attribute(("interface", sel.interface.as_str()));
    start.push_attribute(("id", sel.id.as_str()));
    if let Some(version) = &sel.version {
        start.push_attribute(("version", version.as_str()));
    }
    if let Some(main) = &sel.main {
        start.push_attribute(("main", main.as_str()));
    }

    let has_children =
        !sel.bindings.is_empty() || !sel.dependencies.is_empty() || sel.source.is_some();
    if !has_children {
        return writer.write_event(Event::Empty(start)).map_err(xml_error);
    }

    writer.write_event(Event::Start(start)).map_err(xml_error)?;

    for binding in &sel.bindings {
        write_binding(writer, binding)?;
    }

    for dep in &sel.dependencies {
        let mut requires = BytesStart::new("requires");
        requires.push_attribute(("interface", dep.interface.as_str()));
        if dep.bindings.is_empty() {
            writer.write_event(Event::Empty(requires)).map_err(xml_error)?;
            continue;
        }
        writer.write_event(Event::Start(requires)).map_err(xml_error)?;
        for binding in &dep.bindings {
            write_binding(writer, binding)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("requires")))
            .map_err(xml_error)?;
    }

    if let Some(href) = &sel.source {
        let mut archive = BytesStart::new("archive");
        archive.push_attribute(("href", href.as_str()));
        writer.write_event(Event::Empty(archive)).map_err(xml_error)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("selection")))
        .map_err(xml_error)
}

fn write_binding(writer: &mut Writer<Vec<u8>>, binding: &Binding) -> Result<()> {
    match binding {
        Binding::Environment(env) => {
            let mut elem = BytesStart::new("environment");
            elem.push_attribute(("name", env.name.as_str()));
            match &env.source {
                BindingSource::Insert(insert) => elem.push_attribute(("insert", insert.as_str())),
                BindingSource::Value(value) => elem.push_attribute(("value", value.as_str())),
            }
            if env.mode != BindingMode::default() {
                elem.push_attribute(("mode", env.mode.as_str()));
            }
            if env.separator != DEFAULT_SEPARATOR {
                elem.push_attribute(("separator", env.separator.as_str()));
            }
            if let Some(default) = &env.default {
                elem.push_attribute(("default", default.as_str()));
            }
            writer.write_event(Event::Empty(elem)).map_err(xml_error)
        }
    }
}

/// Parse a canonical selections document and validate its graph.
pub fn from_xml(text: &str) -> Result<Selections> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut sels: Option<Selections> = None;
    let mut current: Option<Selection> = None;
    let mut requires: Option<Dependency> = None;

    loop {
        let (elem, empty) = match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(e) => {
                match e.name().as_ref() {
                    b"requires" => close_requires(&mut current, &mut requires)?,
                    b"selection" => close_selection(&mut sels, &mut current)?,
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = elem.name();
        match name.as_ref() {
            b"selections" => {
                let attrs = AttrMap::read(elem.attributes())?;
                sels = Some(Selections::new(attrs.required("selections", "interface")?));
            }
            b"selection" => {
                let attrs = AttrMap::read(elem.attributes())?;
                let mut sel = Selection::new(
                    attrs.required("selection", "interface")?,
                    attrs.required("selection", "id")?,
                );
                sel.version = attrs.optional("version");
                sel.main = attrs.optional("main");
                trace!(interface = %sel.interface, id = %sel.id, "parsed selection");
                current = Some(sel);
                if empty {
                    close_selection(&mut sels, &mut current)?;
                }
            }
            b"requires" => {
                let attrs = AttrMap::read(elem.attributes())?;
                requires = Some(Dependency::new(attrs.required("requires", "interface")?));
                if empty {
                    close_requires(&mut current, &mut requires)?;
                }
            }
            b"environment" => {
                let binding = parse_environment(&AttrMap::read(elem.attributes())?)?;
                match (requires.as_mut(), current.as_mut()) {
                    (Some(dep), _) => dep.bindings.push(binding),
                    (None, Some(sel)) => sel.bindings.push(binding),
                    (None, None) => {
                        return Err(LaunchError::Selections(
                            "<environment> outside of a <selection>".to_string(),
                        ));
                    }
                }
            }
            b"archive" => {
                let attrs = AttrMap::read(elem.attributes())?;
                let href = attrs.required("archive", "href")?;
                match current.as_mut() {
                    Some(sel) => sel.source = Some(href),
                    None => {
                        return Err(LaunchError::Selections(
                            "<archive> outside of a <selection>".to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    let sels = sels.ok_or_else(|| {
        LaunchError::Selections("missing <selections> root element".to_string())
    })?;
    sels.validate()?;
    Ok(sels)
}

fn close_requires(current: &mut Option<Selection>, requires: &mut Option<Dependency>) -> Result<()> {
    let (Some(sel), Some(dep)) = (current.as_mut(), requires.take()) else {
        return Err(LaunchError::Selections(
            "<requires> outside of a <selection>".to_string(),
        ));
    };
    sel.dependencies.push(dep);
    Ok(())
}

fn close_selection(sels: &mut Option<Selections>, current: &mut Option<Selection>) -> Result<()> {
    let (Some(sels), Some(sel)) = (sels.as_mut(), current.take()) else {
        return Err(LaunchError::Selections(
            "<selection> outside of <selections>".to_string(),
        ));
    };
    sels.insert(sel);
    Ok(())
}

fn parse_environment(attrs: &AttrMap) -> Result<Binding> {
    let name = attrs.required("environment", "name")?;
    let mut binding = match (attrs.optional("insert"), attrs.optional("value")) {
        (Some(insert), None) => EnvironmentBinding::insert(name, insert),
        (None, Some(value)) => EnvironmentBinding::value(name, value),
        _ => {
            return Err(LaunchError::Selections(format!(
                "<environment name='{name}'> needs exactly one of 'insert' or 'value'"
            )));
        }
    };
    if let Some(mode) = attrs.optional("mode") {
        binding = binding.with_mode(mode.parse()?);
    }
    if let Some(separator) = attrs.optional("separator") {
        binding = binding.with_separator(separator);
    }
    if let Some(default) = attrs.optional("default") {
        binding = binding.with_default(default);
    }
    Ok(binding.into())
}

/// Unescaped attributes of one element.
struct AttrMap(Vec<(String, String)>);

impl AttrMap {
    fn read(attributes: Attributes<'_>) -> Result<Self> {
        let mut out = Vec::new();
        for attr in attributes {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            out.push((key, value));
        }
        Ok(Self(out))
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn required(&self, element: &str, key: &str) -> Result<String> {
        self.optional(key).ok_or_else(|| {
            LaunchError::Selections(format!("<{element}> is missing the '{key}' attribute"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<selections interface="http://example.com/app">
  <selection interface="http://example.com/app" id="sha256=aaa" version="1.2" main="bin/app">
    <environment name="PATH" insert="bin"/>
    <requires interface="http://example.com/python">
      <environment name="PYTHON" value="python3" mode="replace"/>
    </requires>
    <archive href="http://example.com/app-1.2.tgz"/>
  </selection>
  <selection interface="http://example.com/python" id="package:deb:python3:3.11"/>
</selections>
"#;

    #[test]
    fn parses_sample_document() {
        let sels = from_xml(SAMPLE).unwrap();
        assert_eq!(sels.interface, "http://example.com/app");
        assert_eq!(sels.len(), 2);

        let root = sels.root().unwrap();
        assert_eq!(root.version.as_deref(), Some("1.2"));
        assert_eq!(root.main.as_deref(), Some("bin/app"));
        assert_eq!(root.source.as_deref(), Some("http://example.com/app-1.2.tgz"));
        assert_eq!(
            root.bindings,
            vec![Binding::from(EnvironmentBinding::insert("PATH", "bin"))]
        );
        assert_eq!(root.dependencies.len(), 1);
        assert_eq!(
            root.dependencies[0].bindings,
            vec![Binding::from(
                EnvironmentBinding::value("PYTHON", "python3").with_mode(BindingMode::Replace)
            )]
        );

        assert!(sels.get("http://example.com/python").unwrap().is_package());
    }

    #[test]
    fn serialization_is_stable_and_parses_back() {
        let sels = from_xml(SAMPLE).unwrap();
        let first = to_xml(&sels).unwrap();
        let second = to_xml(&from_xml(&first).unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("<?xml"));
    }

    #[test]
    fn special_characters_are_escaped() {
        let mut sels = Selections::new("http://example.com/a?x=1&y=2");
        let mut sel = Selection::new("http://example.com/a?x=1&y=2", "/opt/a");
        sel.main = Some("run \"it\" <now>".to_string());
        sels.insert(sel);

        let text = to_xml(&sels).unwrap();
        assert!(text.contains("&amp;"));
        assert!(!text.contains("<now>"));
        assert_eq!(from_xml(&text).unwrap(), sels);
    }

    #[test]
    fn environment_needs_insert_or_value() {
        let doc = r#"<selections interface="a"><selection interface="a" id="/a">
            <environment name="X"/></selection></selections>"#;
        assert!(matches!(from_xml(doc), Err(LaunchError::Selections(_))));
    }

    #[test]
    fn dangling_requires_fails_validation() {
        let doc = r#"<selections interface="a"><selection interface="a" id="/a">
            <requires interface="b"/></selection></selections>"#;
        assert!(matches!(from_xml(doc), Err(LaunchError::MissingSelection(_))));
    }
}
