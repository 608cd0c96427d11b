// tests/selections_document.rs

use std::io::Cursor;

use zlaunch::errors::LaunchError;
use zlaunch::selections::{handoff, xml, BindingMode, EnvironmentBinding};
use zlaunch_test_utils::builders::{SelectionBuilder, SelectionsBuilder};

const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<selections interface="http://example.com/editor">
  <selection interface="http://example.com/editor" id="sha256=ed" version="3.1" main="bin/editor">
    <environment name="XDG_DATA_DIRS" insert="share" mode="append"/>
    <requires interface="http://example.com/gtk">
      <environment name="LD_LIBRARY_PATH" insert="lib"/>
    </requires>
    <requires interface="http://example.com/python"/>
    <archive href="http://example.com/editor-3.1.tar.gz"/>
  </selection>
  <selection interface="http://example.com/gtk" id="sha256=gtk" version="3.24">
    <requires interface="http://example.com/python"/>
  </selection>
  <selection interface="http://example.com/python" id="package:deb:python3:3.11"/>
</selections>
"#;

#[test]
fn test_document_with_shared_dependency_parses() {
    let sels = xml::from_xml(DOC).unwrap();

    assert_eq!(sels.len(), 3);
    let root = sels.root().unwrap();
    assert_eq!(root.dependencies.len(), 2);
    assert!(sels.get("http://example.com/python").unwrap().is_package());
    assert_eq!(
        root.source.as_deref(),
        Some("http://example.com/editor-3.1.tar.gz")
    );
}

#[test]
fn test_handoff_stream_carries_the_same_document() {
    let sels = xml::from_xml(DOC).unwrap();

    let mut stream = handoff::encode(&sels).unwrap();
    stream.extend_from_slice(b"trailing data for the next reader");
    let mut cursor = Cursor::new(stream);

    let received = handoff::read(&mut cursor).unwrap();
    assert_eq!(received, sels);
    assert_eq!(cursor.position() as usize, 9 + xml::to_xml(&sels).unwrap().len());
}

#[test]
fn test_truncated_handoff_is_an_error() {
    let sels = xml::from_xml(DOC).unwrap();
    let mut stream = handoff::encode(&sels).unwrap();
    stream.truncate(stream.len() - 5);

    let err = handoff::read(&mut Cursor::new(stream)).unwrap_err();
    assert!(matches!(err, LaunchError::Handoff(_)));
}

#[test]
fn test_cycles_are_rejected_on_load() {
    let doc = r#"<selections interface="http://example.com/a">
  <selection interface="http://example.com/a" id="sha256=a"><requires interface="http://example.com/b"/></selection>
  <selection interface="http://example.com/b" id="sha256=b"><requires interface="http://example.com/a"/></selection>
</selections>"#;

    match xml::from_xml(doc) {
        Err(LaunchError::SelectionCycle(msg)) => assert!(msg.contains("http://example.com/")),
        other => panic!("Expected SelectionCycle, got: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_builder_output_serializes_binding_options() {
    let sels = SelectionsBuilder::new("http://example.com/tool")
        .with(
            SelectionBuilder::new("http://example.com/tool", "sha256=t")
                .main("tool")
                .binding(
                    EnvironmentBinding::value("TOOL_OPTS", "-q")
                        .with_mode(BindingMode::Replace),
                )
                .binding(
                    EnvironmentBinding::insert("CLASSPATH", "lib/tool.jar")
                        .with_separator(";")
                        .with_default("/usr/share/java"),
                ),
        )
        .build();

    let text = xml::to_xml(&sels).unwrap();
    assert!(text.contains(r#"name="TOOL_OPTS" value="-q" mode="replace""#), "{text}");
    assert!(
        text.contains(r#"name="CLASSPATH" insert="lib/tool.jar" separator=";" default="/usr/share/java""#),
        "{text}"
    );
    assert_eq!(xml::from_xml(&text).unwrap(), sels);
}
