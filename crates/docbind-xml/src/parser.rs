//! XML parser that builds bound element trees.
//!
//! Each start tag is looked up in the metadata of the element it appears
//! in. Declared attributes and text go through the metadata's parse hooks
//! (datatype conversion, virtual values), declared children are created
//! through the schema's factories, and anything the metadata does not
//! declare is kept as undeclared content.

use crate::{Error, Result};
use docbind_model::{
    Element, ElementKey, ElementMetadata, MultipleVirtualElement, Namespace, QName, Value,
    convert_str,
};
use quick_xml::NsReader;
use quick_xml::events::{BytesCData, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use std::sync::Arc;
use tracing::trace;

/// Parse `content` into an element tree bound to `metadata`.
///
/// The root element must carry the name `metadata` declares. The result is
/// bound but not yet validated; call [`Element::resolve`] to validate it.
///
/// # Example
///
/// ```rust
/// use docbind_model::{AttributeKey, ElementKey, MetadataRegistry, QName, Value};
///
/// let registry = MetadataRegistry::new();
/// let entry = ElementKey::container(QName::local("entry"));
/// let id = AttributeKey::string(QName::local("id"));
/// registry.build(&entry).add_attribute(&id).set_required(true);
/// let metadata = registry.bind_element(&entry).unwrap();
///
/// let element = docbind_xml::parse(r#"<entry id="urn:1"/>"#, &metadata).unwrap();
/// assert_eq!(element.attribute_value(id.id()), Some(Value::from("urn:1")));
/// assert!(element.resolve(&metadata).is_ok());
/// ```
///
/// # Errors
///
/// Returns an error if the XML is malformed, if the root element is not the
/// declared one, or if declared content fails to parse.
pub fn parse(content: &str, metadata: &ElementMetadata) -> Result<Element> {
    XmlParser::new(content, Some(metadata)).parse()
}

/// Parse `content` into a tree with no metadata. Every attribute and child
/// is undeclared, and text is kept as strings.
pub fn parse_unbound(content: &str) -> Result<Element> {
    XmlParser::new(content, None).parse()
}

/// Where a finished element is added.
struct Target {
    element: Element,
    metadata: Option<ElementMetadata>,
}

/// Repeating virtual children collected until their parent closes.
struct Pending {
    target: Element,
    target_metadata: ElementMetadata,
    key: ElementKey,
    metadata: ElementMetadata,
    handler: Arc<dyn MultipleVirtualElement>,
    elements: Vec<Element>,
}

/// An element being parsed.
struct Frame {
    element: Element,

    /// Key the element is added under.
    key: ElementKey,

    metadata: Option<ElementMetadata>,

    /// `None` for the root.
    target: Option<Target>,

    /// Text accumulated so far.
    text: String,

    has_children: bool,

    pending: Vec<Pending>,
}

impl Frame {
    fn new(
        element: Element,
        key: ElementKey,
        metadata: Option<ElementMetadata>,
        target: Option<Target>,
    ) -> Self {
        Self {
            element,
            key,
            metadata,
            target,
            text: String::new(),
            has_children: false,
            pending: Vec::new(),
        }
    }
}

struct XmlParser<'a> {
    reader: NsReader<&'a [u8]>,

    /// Metadata of the root element.
    metadata: Option<&'a ElementMetadata>,

    stack: Vec<Frame>,
}

impl<'a> XmlParser<'a> {
    fn new(source: &'a str, metadata: Option<&'a ElementMetadata>) -> Self {
        let mut reader = NsReader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        Self {
            reader,
            metadata,
            stack: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Element> {
        let mut root: Option<Element> = None;

        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    self.check_single_root(&root)?;
                    self.handle_start(&e)?;
                }
                Ok(Event::Empty(e)) => {
                    self.check_single_root(&root)?;
                    self.handle_start(&e)?;
                    if let Some(element) = self.handle_end()? {
                        root = Some(element);
                    }
                }
                Ok(Event::End(_)) => {
                    if let Some(element) = self.handle_end()? {
                        root = Some(element);
                    }
                }
                Ok(Event::Text(e)) => {
                    self.handle_text(e)?;
                }
                Ok(Event::CData(e)) => {
                    self.handle_cdata(e);
                }
                Ok(Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {
                    // Skip comments, processing instructions and declarations
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlSyntax {
                        message: e.to_string(),
                        position: Some(self.reader.error_position()),
                    });
                }
            }
        }

        if let Some(frame) = self.stack.last() {
            return Err(Error::UnexpectedEof {
                expected: format!("closing tag for <{}>", frame.element.id()),
            });
        }

        root.ok_or(Error::EmptyDocument)
    }

    fn check_single_root(&self, root: &Option<Element>) -> Result<()> {
        if self.stack.is_empty() && root.is_some() {
            return Err(Error::MultipleRoots);
        }
        Ok(())
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let id = self.resolve_name(e.name(), false)?;
        let frame = if self.stack.is_empty() {
            self.open_root(id)?
        } else {
            self.open_child(id)?
        };
        self.read_attributes(e, &frame)?;
        self.stack.push(frame);
        Ok(())
    }

    fn open_root(&self, id: QName) -> Result<Frame> {
        let Some(metadata) = self.metadata else {
            let key = ElementKey::string(id);
            return Ok(Frame::new(Element::new(key.clone()), key, None, None));
        };
        if !metadata.name().matches(&id) {
            return Err(Error::UnexpectedRoot {
                expected: metadata.name().clone(),
                found: id,
            });
        }
        Ok(Frame::new(
            metadata.create_element()?,
            metadata.key().clone(),
            Some(metadata.clone()),
            None,
        ))
    }

    fn open_child(&mut self, id: QName) -> Result<Frame> {
        let Some(parent) = self.stack.last_mut() else {
            return Err(Error::MultipleRoots);
        };
        parent.has_children = true;

        let mut target = Target {
            element: parent.element.clone(),
            metadata: parent.metadata.clone(),
        };
        let mut found = target.metadata.as_ref().and_then(|m| m.find_element(&id));

        // Children of a flattened declaration appear directly in its parent.
        if found.is_none()
            && let Some(metadata) = &target.metadata
            && let Some((holder_key, holder_metadata, key)) = find_flattened(metadata, &id)
        {
            let holder = flattened_holder(&target.element, &holder_key, &holder_metadata)?;
            target = Target {
                element: holder,
                metadata: Some(holder_metadata),
            };
            found = Some(key);
        }

        let Some(key) = found else {
            trace!(%id, "undeclared element");
            let key = ElementKey::string(id);
            return Ok(Frame::new(
                Element::new(key.clone()),
                key,
                None,
                Some(target),
            ));
        };

        let metadata = target.metadata.as_ref().and_then(|m| m.bind_element(&key));
        let element = match &metadata {
            Some(metadata) => metadata.create_element()?,
            None => Element::new(key.clone()),
        };
        Ok(Frame::new(element, key, metadata, Some(target)))
    }

    fn read_attributes(&self, e: &BytesStart<'_>, frame: &Frame) -> Result<()> {
        for attr in e.attributes() {
            let attr = attr?;
            let raw = attr.key.as_ref();
            if raw == b"xmlns" || raw.starts_with(b"xmlns:") {
                continue;
            }

            let id = self.resolve_name(attr.key, true)?;
            let value = attr.unescape_value()?.into_owned();

            let declared = frame.metadata.as_ref().and_then(|m| {
                m.find_attribute(&id)
                    .and_then(|key| m.bind_attribute(&key))
                    .map(|attribute| (m, attribute))
            });
            match declared {
                Some((metadata, attribute)) => {
                    attribute.parse_value(&frame.element, metadata, Value::from(value))?;
                }
                None => {
                    trace!(%id, "undeclared attribute");
                    frame.element.set_undeclared_attribute(id, value)?;
                }
            }
        }
        Ok(())
    }

    fn handle_text(&mut self, e: BytesText<'_>) -> Result<()> {
        let text = e.unescape().map_err(|err| Error::XmlSyntax {
            message: format!("Invalid text content: {}", err),
            position: Some(self.reader.buffer_position()),
        })?;

        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(&text);
        }
        Ok(())
    }

    fn handle_cdata(&mut self, e: BytesCData<'_>) {
        let text = String::from_utf8_lossy(e.as_ref());
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(&text);
        }
    }

    /// Close the innermost element. Returns the element if it was the root.
    fn handle_end(&mut self) -> Result<Option<Element>> {
        let Some(mut frame) = self.stack.pop() else {
            return Err(Error::XmlSyntax {
                message: "Unexpected closing tag".to_string(),
                position: Some(self.reader.buffer_position()),
            });
        };

        finish_text(&frame)?;
        for pending in frame.pending.drain(..) {
            pending.handler.parse_multiple(
                &pending.target,
                &pending.target_metadata,
                pending.elements,
                &pending.metadata,
            )?;
        }

        match frame.target.take() {
            None => Ok(Some(frame.element)),
            Some(target) => {
                self.attach(target, frame)?;
                Ok(None)
            }
        }
    }

    fn attach(&mut self, target: Target, frame: Frame) -> Result<()> {
        let Frame {
            element,
            key,
            metadata,
            ..
        } = frame;

        if let (Some(metadata), Some(target_metadata)) = (&metadata, &target.metadata) {
            if let Some(handler) = metadata.single_virtual_element() {
                handler.parse_single(&target.element, target_metadata, element, metadata)?;
                return Ok(());
            }
            if let Some(handler) = metadata.multiple_virtual_element()
                && let Some(parent) = self.stack.last_mut()
            {
                let existing = parent
                    .pending
                    .iter_mut()
                    .find(|p| p.key == key && p.target.same_storage(&target.element));
                match existing {
                    Some(pending) => pending.elements.push(element),
                    None => parent.pending.push(Pending {
                        target: target.element,
                        target_metadata: target_metadata.clone(),
                        key,
                        metadata: metadata.clone(),
                        handler,
                        elements: vec![element],
                    }),
                }
                return Ok(());
            }
        }

        target.element.add_element_as(&key, element)?;
        Ok(())
    }

    fn resolve_name(&self, name: quick_xml::name::QName<'_>, attribute: bool) -> Result<QName> {
        let (resolved, local) = if attribute {
            self.reader.resolve_attribute(name)
        } else {
            self.reader.resolve_element(name)
        };
        let local = String::from_utf8_lossy(local.as_ref()).into_owned();

        match resolved {
            ResolveResult::Unbound => Ok(QName::local(local)),
            ResolveResult::Bound(ns) => {
                let uri = String::from_utf8_lossy(ns.as_ref()).into_owned();
                let namespace = match name.prefix() {
                    Some(prefix) => {
                        Namespace::new(String::from_utf8_lossy(prefix.as_ref()).into_owned(), uri)
                    }
                    None => Namespace::unaliased(uri),
                };
                Ok(QName::new(namespace, local))
            }
            ResolveResult::Unknown(prefix) => Err(Error::UnknownPrefix {
                prefix: String::from_utf8_lossy(&prefix).into_owned(),
            }),
        }
    }
}

/// Store the text of a closed element. Whitespace between child elements is
/// dropped.
fn finish_text(frame: &Frame) -> Result<()> {
    let text = if frame.has_children {
        frame.text.trim()
    } else {
        frame.text.as_str()
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    match &frame.metadata {
        Some(metadata) => {
            metadata.parse_value(&frame.element, metadata, Value::from(text))?;
        }
        None => {
            let value = convert_str(text, frame.element.key().datatype())?;
            frame.element.set_text_value(value)?;
        }
    }
    Ok(())
}

/// A flattened child of `metadata` that declares `id`.
fn find_flattened(
    metadata: &ElementMetadata,
    id: &QName,
) -> Option<(ElementKey, ElementMetadata, ElementKey)> {
    metadata
        .elements()
        .filter(|key| !key.is_undeclared_marker())
        .filter_map(|key| Some((key.clone(), metadata.bind_element(key)?)))
        .filter(|(_, child)| child.is_flattened())
        .find_map(|(holder_key, holder)| {
            let key = holder.find_element(id)?;
            Some((holder_key, holder, key))
        })
}

/// The stored flattened child of `parent`, created on first use.
fn flattened_holder(
    parent: &Element,
    key: &ElementKey,
    metadata: &ElementMetadata,
) -> Result<Element> {
    if let Some(existing) = parent.element_by_key(key)? {
        return Ok(existing);
    }
    let holder = metadata.create_element()?;
    parent.add_element_as(key, holder.clone())?;
    Ok(parent.element_by_key(key)?.unwrap_or(holder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbind_model::{AttributeKey, MetadataRegistry};

    #[test]
    fn test_parse_unbound_keeps_everything() {
        let element = parse_unbound(r#"<a x="1"><b>text</b><b/></a>"#).unwrap();
        assert_eq!(element.id(), &QName::local("a"));
        assert_eq!(element.attribute_value(&QName::local("x")), Some(Value::from("1")));
        let children = element.elements(&QName::local("b"));
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].text_value(), Some(Value::from("text")));
        assert!(children[1].text_value().is_none());
    }

    #[test]
    fn test_whitespace_between_children_is_dropped() {
        let element = parse_unbound("<a>\n  <b> spaced </b>\n</a>").unwrap();
        assert!(element.text_value().is_none());
        let child = element.element(&QName::local("b")).unwrap().unwrap();
        assert_eq!(child.text_value(), Some(Value::from(" spaced ")));
    }

    #[test]
    fn test_prefixed_names_resolve_to_namespaces() {
        let element =
            parse_unbound(r#"<a xmlns:x="urn:x" x:attr="v"><x:b/></a>"#).unwrap();
        let ns = Namespace::unaliased("urn:x");
        assert_eq!(
            element.attribute_value(&QName::new(ns.clone(), "attr")),
            Some(Value::from("v"))
        );
        assert!(element.has_element(&QName::new(ns, "b")));
    }

    #[test]
    fn test_document_structure_errors() {
        assert!(matches!(parse_unbound(""), Err(Error::EmptyDocument)));
        assert!(matches!(parse_unbound("<a/><b/>"), Err(Error::MultipleRoots)));
        assert!(matches!(
            parse_unbound("<a><x:b/></a>"),
            Err(Error::UnknownPrefix { .. })
        ));
    }

    #[test]
    fn test_root_must_match_metadata() {
        let registry = MetadataRegistry::new();
        let entry = ElementKey::container(QName::local("entry"));
        registry
            .build(&entry)
            .add_attribute(&AttributeKey::string(QName::local("id")));
        let metadata = registry.bind_element(&entry).unwrap();

        let err = parse("<feed/>", &metadata).unwrap_err();
        assert!(matches!(err, Error::UnexpectedRoot { .. }));
    }
}
