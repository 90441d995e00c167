//! Parse and regenerate documents through bound metadata.

use docbind_model::{
    AttributeKey, Cardinality, Datatype, ElementKey, ElementType, MetadataRegistry, Namespace,
    ParseError, Path, QName, Value,
};
use docbind_xml::{Error, parse, to_string, to_string_pretty};

const ATOM: &str = "http://www.w3.org/2005/Atom";
const GD: &str = "http://schemas.google.com/g/2005";

fn atom(local: &str) -> QName {
    QName::new(Namespace::new("atom", ATOM), local)
}

fn gd(local: &str) -> QName {
    QName::new(Namespace::new("gd", GD), local)
}

fn q(local: &str) -> QName {
    QName::local(local)
}

struct Feed {
    registry: MetadataRegistry,
    feed: ElementKey,
    entry: ElementKey,
    title: ElementKey,
    link: ElementKey,
    etag: AttributeKey,
    href: AttributeKey,
}

/// feed(title, entry*) / entry(@gd:etag, title required, link*) /
/// link(@rel, @href required)
fn feed() -> Feed {
    let registry = MetadataRegistry::new();
    let feed = ElementKey::container(atom("feed"));
    let entry = ElementKey::container(atom("entry"));
    let title = ElementKey::string(atom("title"));
    let link = ElementKey::container(atom("link"));
    let etag = AttributeKey::string(gd("etag"));
    let rel = AttributeKey::string(q("rel"));
    let href = AttributeKey::string(q("href"));

    let feed_creator = registry.build(&feed);
    feed_creator.add_element(&title);
    feed_creator
        .add_element(&entry)
        .set_cardinality(Cardinality::Multiple);

    let entry_creator = registry.build(&entry);
    entry_creator.add_attribute(&etag);
    entry_creator.add_element(&title).set_required(true);
    entry_creator
        .add_element(&link)
        .set_cardinality(Cardinality::Multiple);

    let link_creator = registry.build(&link);
    link_creator.add_attribute(&rel);
    link_creator.add_attribute(&href).set_required(true);

    Feed {
        registry,
        feed,
        entry,
        title,
        link,
        etag,
        href,
    }
}

const DOCUMENT: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005">
  <title>Example</title>
  <entry gd:etag="W1">
    <title>First</title>
    <link rel="alternate" href="http://example.com/1"/>
    <link href="http://example.com/1.xml"/>
  </entry>
  <entry>
    <title>Second &amp; last</title>
    <extra kind="x">keep</extra>
  </entry>
</feed>
"#;

#[test]
fn test_parse_binds_declared_and_keeps_undeclared() {
    let fixture = feed();
    let metadata = fixture.registry.bind_element(&fixture.feed).unwrap();
    let parsed = parse(DOCUMENT, &metadata).unwrap();
    let resolved = parsed.resolve(&metadata).unwrap();

    let entries = resolved.elements(fixture.entry.id());
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.metadata().is_some()));

    assert_eq!(
        entries[0].attribute_value(fixture.etag.id()),
        Some(Value::from("W1"))
    );
    let links = entries[0].elements(fixture.link.id());
    assert_eq!(links.len(), 2);
    assert_eq!(
        links[1].attribute_value(fixture.href.id()),
        Some(Value::from("http://example.com/1.xml"))
    );

    let title = entries[1].element(fixture.title.id()).unwrap().unwrap();
    assert_eq!(title.text_value(), Some(Value::from("Second & last")));

    let extra = entries[1].element(&atom("extra")).unwrap().unwrap();
    assert!(extra.metadata().is_none());
    assert_eq!(extra.attribute_value(&q("kind")), Some(Value::from("x")));
    assert_eq!(extra.text_value(), Some(Value::from("keep")));
}

#[test]
fn test_round_trip_output() {
    let fixture = feed();
    let metadata = fixture.registry.bind_element(&fixture.feed).unwrap();
    let parsed = parse(DOCUMENT, &metadata).unwrap();

    insta::assert_snapshot!(
        to_string(&parsed).unwrap(),
        @r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:gd="http://schemas.google.com/g/2005"><title>Example</title><entry gd:etag="W1"><title>First</title><link rel="alternate" href="http://example.com/1"/><link href="http://example.com/1.xml"/></entry><entry><title>Second &amp; last</title><extra kind="x">keep</extra></entry></feed>"#
    );
}

#[test]
fn test_pretty_output_indents_children() {
    let fixture = feed();
    let metadata = fixture.registry.bind_element(&fixture.feed).unwrap();
    let parsed = parse(DOCUMENT, &metadata).unwrap();

    let pretty = to_string_pretty(&parsed).unwrap();
    assert!(pretty.contains("\n  <title>Example</title>"));
    assert!(pretty.contains("\n    <title>First</title>"));
}

#[test]
fn test_missing_required_child_fails_resolution() {
    let fixture = feed();
    let metadata = fixture.registry.bind_element(&fixture.feed).unwrap();
    let parsed = parse(
        r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry/></feed>"#,
        &metadata,
    )
    .unwrap();

    let err = parsed.resolve(&metadata).unwrap_err();
    let codes: Vec<(&str, String)> = err
        .errors()
        .iter()
        .map(|e| (e.error_code(), e.instance_path.to_string()))
        .collect();
    assert_eq!(codes, vec![("B-1-04", "/feed/entry".to_string())]);
}

#[test]
fn test_typed_attribute_conversion() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let count = AttributeKey::of(q("count"), Datatype::Integer);
    registry.build(&entry).add_attribute(&count);
    let metadata = registry.bind_element(&entry).unwrap();

    let element = parse(r#"<entry count="3"/>"#, &metadata).unwrap();
    assert_eq!(element.attribute_value(count.id()), Some(Value::Integer(3)));
    assert_eq!(to_string(&element).unwrap(), r#"<entry count="3"/>"#);

    let err = parse(r#"<entry count="many"/>"#, &metadata).unwrap_err();
    assert!(matches!(err, Error::Parse(ParseError::InvalidValue { .. })));
}

#[test]
fn test_moved_attribute_round_trip() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let link = ElementKey::container(q("link"));
    let href = AttributeKey::string(q("href"));
    let link_href = AttributeKey::string(q("linkHref"));

    registry.build(&entry).add_element(&link);
    registry.build(&link).add_attribute(&href);
    let path = Path::of([link.clone().into(), href.clone().into()]).unwrap();
    registry
        .build(&entry)
        .move_attribute(&link_href, &path)
        .unwrap();
    let metadata = registry.bind_element(&entry).unwrap();

    let element = parse(r#"<entry linkHref="http://example.com/"/>"#, &metadata).unwrap();
    let stored = element.element(link.id()).unwrap().unwrap();
    assert_eq!(
        stored.attribute_value(href.id()),
        Some(Value::from("http://example.com/"))
    );

    insta::assert_snapshot!(
        to_string(&element).unwrap(),
        @r#"<entry linkHref="http://example.com/"><link/></entry>"#
    );
}

#[test]
fn test_moved_element_round_trip() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let author = ElementKey::container(q("author"));
    let name = ElementKey::string(q("name"));
    let author_name = ElementKey::string(q("authorName"));

    registry.build(&entry).add_element(&author);
    registry.build(&author).add_element(&name);
    let path = Path::of([author.clone().into(), name.clone().into()]).unwrap();
    registry
        .build(&entry)
        .move_element(&author_name, &path)
        .unwrap();
    let metadata = registry.bind_element(&entry).unwrap();

    let element = parse("<entry><authorName>Ada</authorName></entry>", &metadata).unwrap();
    let stored = element
        .element(author.id())
        .unwrap()
        .unwrap()
        .element(name.id())
        .unwrap()
        .unwrap();
    assert_eq!(stored.text_value(), Some(Value::from("Ada")));

    insta::assert_snapshot!(
        to_string(&element).unwrap(),
        @"<entry><author/><authorName>Ada</authorName></entry>"
    );
}

#[test]
fn test_flattened_children_parse_into_holder() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let group = ElementKey::container(q("group"));
    let rating = ElementKey::of(q("rating"), Datatype::Integer, ElementType::element());

    registry.build(&entry).add_element(&group).flatten();
    registry.build(&group).add_element(&rating);
    let metadata = registry.bind_element(&entry).unwrap();

    let element = parse("<entry><rating>5</rating></entry>", &metadata).unwrap();
    let holder = element.element(group.id()).unwrap().unwrap();
    let stored = holder.element(rating.id()).unwrap().unwrap();
    assert_eq!(stored.text_value(), Some(Value::Integer(5)));

    assert_eq!(
        to_string(&element).unwrap(),
        "<entry><rating>5</rating></entry>"
    );
}
