//! End-to-end binding behavior: declaration, binding, mutation, iteration
//! and resolution through the public API.

use docbind_model::{
    AttributeKey, Cardinality, Datatype, Element, ElementError, ElementKey, MetadataRegistry,
    Namespace, Path, PathError, QName, Value, ValidationErrorKind,
};

fn q(local: &str) -> QName {
    QName::local(local)
}

struct Atom {
    registry: MetadataRegistry,
    feed: ElementKey,
    entry: ElementKey,
    title: ElementKey,
    link: ElementKey,
    id: AttributeKey,
}

/// feed(@id required, entry*) / entry(@id required, title required, link*)
fn atom() -> Atom {
    let registry = MetadataRegistry::new();
    let feed = ElementKey::container(q("feed"));
    let entry = ElementKey::container(q("entry"));
    let title = ElementKey::string(q("title"));
    let link = ElementKey::container(q("link"));
    let id = AttributeKey::string(q("id"));

    let feed_creator = registry.build(&feed);
    feed_creator.add_attribute(&id).set_required(true);
    feed_creator
        .add_element(&entry)
        .set_cardinality(Cardinality::Multiple);

    let entry_creator = registry.build(&entry);
    entry_creator.add_attribute(&id).set_required(true);
    entry_creator.add_element(&title).set_required(true);
    entry_creator
        .add_element(&link)
        .set_cardinality(Cardinality::Multiple);

    Atom {
        registry,
        feed,
        entry,
        title,
        link,
        id,
    }
}

#[test]
fn test_missing_id_with_repeated_links_reports_one_error() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let id = AttributeKey::string(q("id"));
    let link = ElementKey::container(q("link"));
    let creator = registry.build(&entry);
    creator.add_attribute(&id).set_required(true);
    creator
        .add_element(&link)
        .set_cardinality(Cardinality::Multiple);

    let metadata = registry.bind_element(&entry).unwrap();
    let element = metadata.create_element().unwrap();
    element.add_element(Element::new(link.clone())).unwrap();
    element.add_element(Element::new(link.clone())).unwrap();
    assert_eq!(element.elements(link.id()).len(), 2);

    let err = element.resolve(&metadata).unwrap_err();
    assert_eq!(err.errors().len(), 1);
    let error = &err.errors()[0];
    assert_eq!(
        error.kind,
        ValidationErrorKind::MissingAttribute {
            attribute: "id".to_string()
        }
    );
    assert_eq!(error.error_code(), "B-1-03");
    assert_eq!(error.element, q("entry"));
}

#[test]
fn test_resolve_collects_every_error() {
    let atom = atom();
    let metadata = atom.registry.bind_element(&atom.feed).unwrap();
    let feed = metadata.create_element().unwrap();

    // Title present but empty.
    let first = Element::new(atom.entry.clone());
    first.set_attribute_value(&atom.id, "urn:1").unwrap();
    first.add_element(Element::new(atom.title.clone())).unwrap();
    // Title missing.
    let second = Element::new(atom.entry.clone());
    second.set_attribute_value(&atom.id, "urn:2").unwrap();

    feed.add_element(first).unwrap();
    feed.add_element(second).unwrap();

    let err = feed.resolve(&metadata).unwrap_err();
    let found: Vec<(String, String)> = err
        .errors()
        .iter()
        .map(|e| (e.error_code().to_string(), e.instance_path.to_string()))
        .collect();
    assert_eq!(
        found,
        vec![
            ("B-1-03".to_string(), "/feed".to_string()),
            ("B-1-02".to_string(), "/feed/entry[0]/title".to_string()),
            ("B-1-04".to_string(), "/feed/entry[1]".to_string()),
        ]
    );
}

#[test]
fn test_resolve_succeeds_on_valid_tree() {
    let atom = atom();
    let metadata = atom.registry.bind_element(&atom.feed).unwrap();
    let feed = metadata.create_element().unwrap();
    feed.set_attribute_value(&atom.id, "urn:feed").unwrap();
    let entry = Element::new(atom.entry.clone());
    entry.set_attribute_value(&atom.id, "urn:1").unwrap();
    let title = Element::new(atom.title.clone());
    title.set_text_value("Hello").unwrap();
    entry.add_element(title).unwrap();
    feed.add_element(entry).unwrap();

    let resolved = feed.resolve(&metadata).unwrap();
    assert_eq!(resolved.metadata(), Some(&metadata));
    let entries = resolved.elements(atom.entry.id());
    assert_eq!(entries.len(), 1);
    assert!(entries[0].metadata().is_some());
}

#[test]
fn test_required_wildcard_child_matches_concrete_names() {
    let media = Namespace::new("media", "http://search.yahoo.com/mrss/");
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    registry
        .build(&entry)
        .add_element(&ElementKey::string(QName::any_local(media.clone())))
        .set_required(true);
    let metadata = registry.bind_element(&entry).unwrap();

    let empty = metadata.create_element().unwrap();
    let err = empty.resolve(&metadata).unwrap_err();
    assert_eq!(err.errors()[0].error_code(), "B-1-04");

    let element = metadata.create_element().unwrap();
    let thumbnail = Element::new(ElementKey::string(QName::new(media, "thumbnail")));
    thumbnail.set_text_value("a.png").unwrap();
    element.add_element(thumbnail).unwrap();
    assert!(element.resolve(&metadata).is_ok());
}

#[test]
fn test_cardinality_collapse_on_rebind() {
    let atom = atom();
    let mut entry = Element::new(atom.entry.clone());
    let first = Element::new(atom.title.clone());
    first.set_text_value("one").unwrap();
    let second = Element::new(atom.title.clone());
    second.set_text_value("two").unwrap();
    entry.add_element(first.clone()).unwrap();
    entry.add_element(second).unwrap();

    let metadata = atom.registry.bind_element(&atom.entry).unwrap();
    let err = entry.set_metadata(Some(metadata.clone())).unwrap_err();
    assert_eq!(
        err,
        ElementError::CardinalityViolation {
            id: q("title"),
            count: 2
        }
    );

    assert!(entry.remove_element_instance(&first).unwrap());
    entry.set_metadata(Some(metadata)).unwrap();
    let title = entry.element(atom.title.id()).unwrap().unwrap();
    assert_eq!(title.text_value(), Some(Value::from("two")));
}

#[test]
fn test_declared_then_undeclared_iteration() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let x = AttributeKey::string(q("x"));
    let y = AttributeKey::string(q("y"));
    let creator = registry.build(&entry);
    creator.add_attribute(&y);
    creator.add_attribute(&x);

    let metadata = registry.bind_element(&entry).unwrap();
    let element = metadata.create_element().unwrap();
    element.set_undeclared_attribute(q("a"), "1").unwrap();
    element.set_attribute_value(&x, "2").unwrap();
    element.set_attribute_value(&y, "3").unwrap();
    element.set_undeclared_attribute(q("b"), "4").unwrap();

    let order: Vec<String> = element
        .attribute_iterator()
        .map(|a| a.id().to_string())
        .collect();
    assert_eq!(order, vec!["y", "x", "a", "b"]);

    // Without metadata, insertion order.
    let raw: Vec<String> = element
        .attribute_iterator_with(None)
        .map(|a| a.id().to_string())
        .collect();
    assert_eq!(raw, vec!["a", "x", "y", "b"]);
}

#[test]
fn test_undeclared_marker_positions_undeclared_children() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let title = ElementKey::string(q("title"));
    let summary = ElementKey::string(q("summary"));
    let creator = registry.build(&entry);
    creator.add_element(&title);
    creator.add_undeclared_element_marker();
    creator.add_element(&summary);

    let metadata = registry.bind_element(&entry).unwrap();
    let element = metadata.create_element().unwrap();
    for key in [&summary, &ElementKey::string(q("extra")), &title] {
        let child = Element::new(key.clone());
        child.set_text_value(key.id().local_name()).unwrap();
        element.add_element(child).unwrap();
    }

    let order: Vec<String> = element
        .element_iterator()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(order, vec!["title", "extra", "summary"]);
}

#[test]
fn test_set_cardinality_deduplicates() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let category = ElementKey::string(q("category"));
    registry
        .build(&entry)
        .add_element(&category)
        .set_cardinality(Cardinality::Set);

    let metadata = registry.bind_element(&entry).unwrap();
    let element = metadata.create_element().unwrap();
    for term in ["news", "news", "sport"] {
        let child = Element::new(category.clone());
        child.set_text_value(term).unwrap();
        element.add_element(child).unwrap();
    }
    assert_eq!(element.elements(category.id()).len(), 2);
}

#[test]
fn test_path_round_trip_and_unknown_step() {
    let atom = atom();
    let feed = atom.registry.bind_element(&atom.feed).unwrap();
    let path = Path::to(&feed, [atom.entry.clone().into(), atom.id.clone().into()]).unwrap();
    assert!(path.is_absolute());
    assert!(path.selects_attribute());
    assert_eq!(path.to_string(), "entry/@id");

    let again = path.to_absolute(&feed).unwrap();
    assert_eq!(again, path);
    assert_eq!(
        path.selected_attribute().map(|a| a.key().clone()),
        Some(atom.id.clone())
    );

    let err = Path::to(&feed, [ElementKey::string(q("missing")).into()]).unwrap_err();
    assert_eq!(
        err,
        PathError::NoSuchElement {
            parent: q("feed"),
            id: q("missing")
        }
    );

    let relative = path.to_relative();
    assert!(!relative.is_absolute());
    assert_eq!(relative.to_absolute(&feed).unwrap(), path);
}

#[test]
fn test_typed_attribute_value() {
    let registry = MetadataRegistry::new();
    let entry = ElementKey::container(q("entry"));
    let count = AttributeKey::of(q("count"), Datatype::Integer);
    registry.build(&entry).add_attribute(&count);
    let metadata = registry.bind_element(&entry).unwrap();
    let element = metadata.create_element().unwrap();

    metadata
        .bind_attribute(&count)
        .unwrap()
        .parse_value(&element, &metadata, Value::from("42"))
        .unwrap();
    assert_eq!(element.attribute_value(count.id()), Some(Value::Integer(42)));
    assert_eq!(
        element.typed_attribute_value(&count).unwrap(),
        Some(Value::Integer(42))
    );

    let err = metadata
        .bind_attribute(&count)
        .unwrap()
        .parse_value(&element, &metadata, Value::from("many"))
        .unwrap_err();
    assert!(matches!(err, docbind_model::ParseError::InvalidValue { .. }));
}
