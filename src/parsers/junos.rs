/*!
Parsing of Junos NETCONF replies.

Replies are read into a small element tree (`XmlElement`) so lookups can use the
same descendant-search semantics the device queries rely on. Elements match by local
name, so the `junos-interface` default namespace and prefixed names need no special casing.
Attributes are not kept.
*/

use quick_xml::{Reader, events::Event};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplyParseError {
    #[error("XML error at position {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("unbalanced closing element </{0}>")]
    Unbalanced(String),
    #[error("reply contains no root element")]
    Empty,
}

/// One element of a parsed reply. Text is the concatenated, trimmed character data
/// directly inside the element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn parse(xml: &str) -> Result<Self, ReplyParseError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| ReplyParseError::Xml {
                position: reader.error_position(),
                message: e.to_string(),
            })?;
            match event {
                Event::Start(start) => stack.push(XmlElement::named(start.local_name().as_ref())),
                Event::Empty(start) => {
                    let element = XmlElement::named(start.local_name().as_ref());
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::End(end) => {
                    let element = stack.pop().ok_or_else(|| {
                        ReplyParseError::Unbalanced(
                            String::from_utf8_lossy(end.local_name().as_ref()).into_owned(),
                        )
                    })?;
                    Self::attach(&mut stack, &mut root, element);
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        let unescaped = text.unescape().map_err(|e| ReplyParseError::Xml {
                            position: reader.buffer_position(),
                            message: e.to_string(),
                        })?;
                        current.text.push_str(unescaped.trim());
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(String::from_utf8_lossy(&data).trim());
                    }
                }
                Event::Eof => break,
                // Declarations, comments and processing instructions carry nothing we need
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(ReplyParseError::Xml {
                position: reader.buffer_position(),
                message: format!("unclosed element <{}>", open.name),
            });
        }
        root.ok_or(ReplyParseError::Empty)
    }

    fn named(raw: &[u8]) -> Self {
        XmlElement {
            name: String::from_utf8_lossy(raw).into_owned(),
            ..Default::default()
        }
    }

    fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            // The first complete top-level element is the document; anything after it is ignored
            None => {
                if root.is_none() {
                    *root = Some(element);
                }
            }
        }
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// First descendant (document order, excluding `self`) with the given name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_text(&self, name: &str) -> Option<&str> {
        self.find(name).map(|e| e.text.as_str())
    }

    /// All descendants with the given name, in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect_named(name, found);
        }
    }
}

/// An `<rpc-error>` entry of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub severity: String,
    pub message: String,
}

impl RpcError {
    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.severity)
    }
}

/// A single neighbor row of `get-lldp-neighbors-information`.
/// Fields are kept optional; the collector decides how to treat gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LldpNeighbor {
    pub local_interface: Option<String>,
    pub remote_system_name: Option<String>,
    pub remote_port_description: Option<String>,
}

/// Parsed `<rpc-reply>` with typed accessors for the RPCs used during discovery.
#[derive(Debug, Clone)]
pub struct RpcReply {
    root: XmlElement,
}

impl RpcReply {
    pub fn parse(xml: &str) -> Result<Self, ReplyParseError> {
        Ok(Self {
            root: XmlElement::parse(xml)?,
        })
    }

    pub fn errors(&self) -> Vec<RpcError> {
        self.root
            .find_all("rpc-error")
            .into_iter()
            .map(|e| RpcError {
                // RFC 6241 makes severity mandatory; treat a missing one as fatal
                severity: e.child_text("error-severity").unwrap_or("error").to_string(),
                message: e.child_text("error-message").unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// First error with severity `error`. Warnings are ignored.
    pub fn first_error(&self) -> Option<RpcError> {
        self.errors().into_iter().find(RpcError::is_error)
    }

    pub fn is_ok(&self) -> bool {
        self.root.child("ok").is_some()
    }

    /// A commit is acknowledged by `<ok/>` or a `<commit-success/>` inside
    /// `<commit-results>`, and must not carry an error-severity `rpc-error`.
    pub fn commit_succeeded(&self) -> bool {
        self.first_error().is_none() && (self.is_ok() || self.root.find("commit-success").is_some())
    }

    pub fn lldp_neighbors(&self) -> Vec<LldpNeighbor> {
        self.root
            .find_all("lldp-neighbor-information")
            .into_iter()
            .map(|n| LldpNeighbor {
                // Newer releases report the local side as lldp-local-port-id
                local_interface: n
                    .child_text("lldp-local-interface")
                    .or_else(|| n.child_text("lldp-local-port-id"))
                    .map(str::to_string),
                remote_system_name: n.child_text("lldp-remote-system-name").map(str::to_string),
                remote_port_description: n
                    .child_text("lldp-remote-port-description")
                    .map(str::to_string),
            })
            .collect()
    }

    pub fn interface_destination(&self) -> Option<String> {
        self.root.find_text("ifa-destination").map(|s| s.trim().to_string())
    }

    pub fn host_name(&self) -> Option<String> {
        self.root.find_text("host-name").map(|s| s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lldp_neighbors() {
        let reply = RpcReply::parse(include_str!("../../test_data/lldp_neighbors.xml")).unwrap();
        let neighbors = reply.lldp_neighbors();

        assert_eq!(neighbors.len(), 3);
        assert_eq!(
            neighbors[0],
            LldpNeighbor {
                local_interface: Some("ge-0/0/0".to_string()),
                remote_system_name: Some("R2".to_string()),
                remote_port_description: Some("ge-0/0/1".to_string()),
            }
        );
        assert_eq!(neighbors[1].remote_system_name.as_deref(), Some("R3"));
        // Third row has no remote identity at all
        assert_eq!(neighbors[2].local_interface.as_deref(), Some("ge-0/0/5"));
        assert_eq!(neighbors[2].remote_system_name, None);
        assert_eq!(neighbors[2].remote_port_description, None);
    }

    #[test]
    fn test_local_port_id_fallback_and_entities() {
        let reply =
            RpcReply::parse(include_str!("../../test_data/lldp_neighbors_port_id.xml")).unwrap();
        let neighbors = reply.lldp_neighbors();

        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].local_interface.as_deref(), Some("xe-0/0/1"));
        assert_eq!(neighbors[0].remote_system_name.as_deref(), Some("core-sw&1"));
    }

    #[test]
    fn test_empty_neighbor_table() {
        let reply = RpcReply::parse(
            r#"<rpc-reply message-id="1"><lldp-neighbors-information/></rpc-reply>"#,
        )
        .unwrap();
        assert!(reply.lldp_neighbors().is_empty());
    }

    #[test]
    fn test_interface_destination_is_trimmed() {
        let reply =
            RpcReply::parse(include_str!("../../test_data/interface_information.xml")).unwrap();
        assert_eq!(reply.interface_destination().as_deref(), Some("10.0.0.0/30"));
    }

    #[test]
    fn test_host_name() {
        let reply =
            RpcReply::parse(include_str!("../../test_data/software_information.xml")).unwrap();
        assert_eq!(reply.host_name().as_deref(), Some("R1"));
        assert_eq!(reply.interface_destination(), None);
    }

    #[test]
    fn test_commit_success() {
        let reply = RpcReply::parse(include_str!("../../test_data/commit_success.xml")).unwrap();
        assert!(reply.commit_succeeded());

        let ok = RpcReply::parse("<rpc-reply><ok/></rpc-reply>").unwrap();
        assert!(ok.is_ok());
        assert!(ok.commit_succeeded());
    }

    #[test]
    fn test_commit_error_ignores_warnings() {
        let reply = RpcReply::parse(include_str!("../../test_data/commit_error.xml")).unwrap();

        let errors = reply.errors();
        assert_eq!(errors.len(), 2);
        assert!(!errors[0].is_error());

        let first = reply.first_error().unwrap();
        assert_eq!(first.message, "configuration database locked by: admin");
        assert!(!reply.commit_succeeded());
    }

    #[test]
    fn test_warning_only_commit_still_succeeds() {
        let xml = r#"<rpc-reply>
            <rpc-error><error-severity>warning</error-severity><error-message>ignored</error-message></rpc-error>
            <ok/>
        </rpc-reply>"#;
        let reply = RpcReply::parse(xml).unwrap();
        assert!(reply.commit_succeeded());
    }

    #[test]
    fn test_unacknowledged_commit() {
        let reply = RpcReply::parse("<rpc-reply><commit-results/></rpc-reply>").unwrap();
        assert!(!reply.commit_succeeded());
    }

    #[test]
    fn test_server_hello_with_comments() {
        let hello = XmlElement::parse(include_str!("../../test_data/server_hello.xml")).unwrap();
        assert_eq!(hello.name, "hello");
        let capabilities: Vec<&str> = hello
            .find_all("capability")
            .into_iter()
            .map(|c| c.text.as_str())
            .collect();
        assert!(capabilities.contains(&"urn:ietf:params:netconf:base:1.0"));
        assert_eq!(hello.find_text("session-id"), Some("27700"));
    }

    #[test]
    fn test_find_excludes_self_and_child_text_is_direct_only() {
        let root = XmlElement::parse("<a><b><c>deep</c></b><c>shallow</c></a>").unwrap();
        assert_eq!(root.find_text("c"), Some("deep"));
        assert_eq!(root.child_text("c"), Some("shallow"));
        assert!(root.find("a").is_none());
    }

    #[test]
    fn test_malformed_reply() {
        assert!(matches!(
            XmlElement::parse("<rpc-reply><ok></rpc-reply>"),
            Err(ReplyParseError::Xml { .. })
        ));
        assert_eq!(XmlElement::parse("   "), Err(ReplyParseError::Empty));
    }
}
