//! XML generation from bound element trees.
//!
//! Output follows the element's own metadata: declared names, iteration
//! order, hidden and virtual content. The root declares every namespace its
//! metadata references, with the root's namespace as the default one.
//! Names outside those namespaces are declared where they first appear.

use crate::Result;
use docbind_model::{Element, ElementMetadata, Namespace, QName};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::io::Write;

/// Serialize `element` without indentation.
pub fn to_string(element: &Element) -> Result<String> {
    let mut out = Vec::new();
    write(&mut out, element, None)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Serialize `element` with two-space indentation.
pub fn to_string_pretty(element: &Element) -> Result<String> {
    let mut out = Vec::new();
    write(&mut out, element, Some(2))?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Write `element` to `sink`, indenting by `indent` spaces per level if set.
pub fn write<W: Write>(sink: W, element: &Element, indent: Option<usize>) -> Result<()> {
    let writer = match indent {
        Some(size) => Writer::new_with_indent(sink, b' ', size),
        None => Writer::new(sink),
    };
    let mut generator = XmlGenerator {
        writer,
        scopes: Vec::new(),
        generated: 0,
    };
    generator.write_element(element, element.metadata())
}

/// A namespace declaration. A `None` prefix is the default namespace, an
/// empty uri undeclares it.
struct Binding {
    prefix: Option<String>,
    uri: String,
}

struct XmlGenerator<W: Write> {
    writer: Writer<W>,

    /// Declarations per open element, innermost last.
    scopes: Vec<Vec<Binding>>,

    /// Counter for generated prefixes.
    generated: usize,
}

impl<W: Write> XmlGenerator<W> {
    fn write_element(&mut self, element: &Element, metadata: Option<&ElementMetadata>) -> Result<()> {
        let is_root = self.scopes.is_empty();
        if !is_root && metadata.is_some_and(ElementMetadata::is_flattened) {
            return self.write_children(element, metadata);
        }

        self.scopes.push(Vec::new());
        let name = metadata.map_or(element.id(), |m| m.name()).clone();
        let tag = self.element_name(&name);
        if is_root && let Some(metadata) = metadata {
            for ns in metadata.referenced_namespaces() {
                if self.prefix_for(ns.uri()).is_none() && self.default_uri() != Some(ns.uri()) {
                    self.declare_prefixed(&ns);
                }
            }
        }

        let attributes: Vec<(String, String)> = element
            .attribute_iterator_with(metadata)
            .map(|a| (self.attribute_name(a.name()), a.value().to_string()))
            .collect();

        let mut start = BytesStart::new(tag.as_str());
        for binding in self.scopes.last().into_iter().flatten() {
            let key = match &binding.prefix {
                Some(prefix) => format!("xmlns:{}", prefix),
                None => "xmlns".to_string(),
            };
            start.push_attribute((key.as_str(), binding.uri.as_str()));
        }
        for (key, value) in &attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        let text = match metadata {
            Some(metadata) => metadata.generate_value(element, metadata),
            None => element.text_value(),
        };
        let children: Vec<Element> = element.element_iterator_with(metadata).collect();

        if text.is_none() && children.is_empty() {
            self.writer.write_event(Event::Empty(start))?;
        } else {
            self.writer.write_event(Event::Start(start))?;
            if let Some(text) = text {
                let text = text.to_string();
                self.writer.write_event(Event::Text(BytesText::new(&text)))?;
            }
            self.write_each(&children, metadata)?;
            self.writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        }

        self.scopes.pop();
        Ok(())
    }

    fn write_children(&mut self, element: &Element, metadata: Option<&ElementMetadata>) -> Result<()> {
        let children: Vec<Element> = element.element_iterator_with(metadata).collect();
        self.write_each(&children, metadata)
    }

    fn write_each(&mut self, children: &[Element], metadata: Option<&ElementMetadata>) -> Result<()> {
        for child in children {
            let child_metadata = metadata
                .and_then(|m| m.bind_element(child.key()))
                .or_else(|| child.metadata().cloned());
            self.write_element(child, child_metadata.as_ref())?;
        }
        Ok(())
    }

    /// Wire form of an element name, declaring its namespace if needed.
    fn element_name(&mut self, name: &QName) -> String {
        let local = name.local_name();
        let Some(ns) = name.namespace() else {
            if self.default_uri().is_some() {
                self.bind(None, String::new());
            }
            return local.to_string();
        };
        if self.default_uri() == Some(ns.uri()) {
            return local.to_string();
        }
        if let Some(prefix) = self.prefix_for(ns.uri()) {
            return format!("{}:{}", prefix, local);
        }
        if ns.alias().is_none() || self.scopes.len() == 1 {
            self.bind(None, ns.uri().to_string());
            return local.to_string();
        }
        let prefix = self.declare_prefixed(ns);
        format!("{}:{}", prefix, local)
    }

    /// Wire form of an attribute name. Namespaced attributes always carry a
    /// prefix.
    fn attribute_name(&mut self, name: &QName) -> String {
        let local = name.local_name();
        let Some(ns) = name.namespace() else {
            return local.to_string();
        };
        let prefix = match self.prefix_for(ns.uri()) {
            Some(prefix) => prefix,
            None => self.declare_prefixed(ns),
        };
        format!("{}:{}", prefix, local)
    }

    /// Declare `ns` under its alias, or a generated prefix if the alias is
    /// missing or taken.
    fn declare_prefixed(&mut self, ns: &Namespace) -> String {
        let mut candidate = ns.alias().map(str::to_string);
        loop {
            match candidate {
                Some(prefix) if self.resolve_prefix(&prefix).is_none() => {
                    self.bind(Some(prefix.clone()), ns.uri().to_string());
                    return prefix;
                }
                _ => {
                    candidate = Some(format!("ns{}", self.generated));
                    self.generated += 1;
                }
            }
        }
    }

    fn bind(&mut self, prefix: Option<String>, uri: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Binding { prefix, uri });
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.scopes.iter().rev().flat_map(|scope| scope.iter().rev())
    }

    /// The default namespace in scope, if any.
    fn default_uri(&self) -> Option<&str> {
        self.bindings()
            .find(|b| b.prefix.is_none())
            .map(|b| b.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        self.bindings()
            .find(|b| b.prefix.as_deref() == Some(prefix))
            .map(|b| b.uri.as_str())
    }

    /// An in-scope prefix bound to `uri`, not shadowed by an inner binding.
    fn prefix_for(&self, uri: &str) -> Option<String> {
        self.bindings()
            .filter(|b| b.uri == uri)
            .filter_map(|b| b.prefix.as_deref())
            .find(|prefix| self.resolve_prefix(prefix) == Some(uri))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbind_model::ElementKey;

    #[test]
    fn test_unbound_element_writes_stored_content() {
        let root = Element::new(ElementKey::container(QName::local("a")));
        root.set_undeclared_attribute(QName::local("x"), "1 < 2").unwrap();
        let child = Element::new(ElementKey::string(QName::local("b")));
        child.set_text_value("text").unwrap();
        root.add_element(child).unwrap();
        root.add_element(Element::new(ElementKey::string(QName::local("c"))))
            .unwrap();

        assert_eq!(
            to_string(&root).unwrap(),
            r#"<a x="1 &lt; 2"><b>text</b><c/></a>"#
        );
    }

    #[test]
    fn test_namespaces_declared_where_first_used() {
        let ns = Namespace::new("x", "urn:x");
        let root = Element::new(ElementKey::container(QName::local("a")));
        root.set_undeclared_attribute(QName::new(ns.clone(), "attr"), "v")
            .unwrap();
        root.add_element(Element::new(ElementKey::container(QName::new(
            Namespace::unaliased("urn:y"),
            "b",
        ))))
        .unwrap();

        assert_eq!(
            to_string(&root).unwrap(),
            r#"<a xmlns:x="urn:x" x:attr="v"><b xmlns="urn:y"/></a>"#
        );
    }
}
