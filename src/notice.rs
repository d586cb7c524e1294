//! Notice documents and control-message classification.
//!
//! Payloads on the wire are XML: either control documents (handshake,
//! keep-alive) or notices. The full document model is the caller's concern;
//! this module extracts only what the protocol engine needs — the root
//! element, the control role, the document identifier, and the embedded
//! notice-type code — and generates the client's own control documents.

use bytes::Bytes;
use quick_xml::{
    Reader,
    escape::escape,
    events::{BytesStart, Event},
};

use crate::error::DocumentError;

/// Interop constants discriminating control documents from notices.
///
/// These are external protocol constants, not invented semantics; the
/// defaults follow the VOEvent Transport Protocol conventions. Deployments
/// speaking a dialect override the fields through
/// [`ListenerConfigBuilder::vocabulary`](crate::config::ListenerConfigBuilder::vocabulary).
#[derive(Clone, Debug)]
pub struct ControlVocabulary {
    /// Local name of the control-document root element.
    pub control_root: String,
    /// Attribute on the root element carrying the control role.
    pub role_attribute: String,
    /// Role value marking a keep-alive probe.
    pub ping_role: String,
    /// Role value used for the handshake exchange.
    pub handshake_role: String,
    /// Attribute on a notice root carrying its identifier.
    pub id_attribute: String,
    /// `name` of the parameter element carrying the notice-type code.
    pub notice_type_param: String,
    /// Element naming the sender of a control document.
    pub origin_element: String,
    /// Element naming the responder in a keep-alive acknowledgment.
    pub response_element: String,
}

impl Default for ControlVocabulary {
    fn default() -> Self {
        Self {
            control_root: "Transport".to_owned(),
            role_attribute: "role".to_owned(),
            ping_role: "iamalive".to_owned(),
            handshake_role: "authenticate".to_owned(),
            id_attribute: "ivorn".to_owned(),
            notice_type_param: "Packet_Type".to_owned(),
            origin_element: "Origin".to_owned(),
            response_element: "Response".to_owned(),
        }
    }
}

/// Structural summary of one received document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoticeDocument {
    /// Local name of the root element.
    pub root: String,
    /// Control role attribute, if present on the root.
    pub role: Option<String>,
    /// Document identifier attribute, if present on the root.
    pub identifier: Option<String>,
    /// Notice-type code extracted from the type parameter, if present and
    /// numeric.
    pub notice_type: Option<u32>,
    /// Text of the origin element, if present.
    pub origin: Option<String>,
}

/// One alert message accepted off the wire.
///
/// Carries the raw payload bytes alongside the extracted summary; the
/// payload clone handed to a handler is reference-counted and cheap.
#[derive(Clone, Debug)]
pub struct Notice {
    /// Raw XML payload exactly as received.
    pub payload: Bytes,
    /// Extracted structural summary.
    pub document: NoticeDocument,
}

/// Classification of a received frame.
#[derive(Debug)]
pub(crate) enum FrameKind {
    /// Keep-alive probe; answered, never dispatched.
    Ping { origin: Option<String> },
    /// Server half of the handshake exchange.
    HandshakeAck,
    /// An alert payload for the filter and dispatcher.
    Notice(NoticeDocument),
}

fn local_name_owned(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_owned(),
        None => name.into_owned(),
    }
}

/// Decode raw bytes, resolving entity references where possible.
fn unescaped(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    match quick_xml::escape::unescape(&text) {
        Ok(value) => value.into_owned(),
        Err(_) => text.into_owned(),
    }
}

fn attribute_value(element: &BytesStart<'_>, name: &str) -> Result<Option<String>, DocumentError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        if attribute.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(unescaped(&attribute.value)));
        }
    }
    Ok(None)
}

/// Extract the structural summary of a payload.
///
/// # Errors
///
/// Returns [`DocumentError::Malformed`] for unparsable XML and
/// [`DocumentError::MissingRoot`] if the payload holds no element.
pub(crate) fn parse_document(
    payload: &[u8],
    vocabulary: &ControlVocabulary,
) -> Result<NoticeDocument, DocumentError> {
    let mut reader = Reader::from_reader(payload);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut document: Option<NoticeDocument> = None;
    let mut capture_origin = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(DocumentError::Malformed(e)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e) | Event::Empty(e)) => {
                if let Some(doc) = document.as_mut() {
                    let local = local_name_owned(e.name().as_ref());
                    capture_origin = local == vocabulary.origin_element;
                    // Notice-type codes travel as <Param name="..." value="..."/>
                    // style elements; the first matching parameter wins.
                    if doc.notice_type.is_none()
                        && attribute_value(&e, "name")?.as_deref()
                            == Some(vocabulary.notice_type_param.as_str())
                        && let Some(value) = attribute_value(&e, "value")?
                    {
                        doc.notice_type = value.trim().parse().ok();
                    }
                } else {
                    document = Some(NoticeDocument {
                        root: local_name_owned(e.name().as_ref()),
                        role: attribute_value(&e, &vocabulary.role_attribute)?,
                        identifier: attribute_value(&e, &vocabulary.id_attribute)?,
                        notice_type: None,
                        origin: None,
                    });
                }
            }
            Ok(Event::Text(t)) => {
                if capture_origin
                    && let Some(doc) = document.as_mut()
                    && doc.origin.is_none()
                {
                    doc.origin = Some(unescaped(t.as_ref()));
                }
            }
            Ok(Event::End(_)) => capture_origin = false,
            Ok(_) => {}
        }
        buf.clear();
    }

    document.ok_or(DocumentError::MissingRoot)
}

/// Classify a received payload as control traffic or a notice.
///
/// # Errors
///
/// Returns [`DocumentError`] for unparsable payloads and for control
/// documents whose role this client does not recognize; both are
/// message-level and leave the connection untouched.
pub(crate) fn classify(
    payload: &[u8],
    vocabulary: &ControlVocabulary,
) -> Result<FrameKind, DocumentError> {
    let document = parse_document(payload, vocabulary)?;
    if document.root != vocabulary.control_root {
        return Ok(FrameKind::Notice(document));
    }
    match document.role.as_deref() {
        Some(role) if role == vocabulary.ping_role => Ok(FrameKind::Ping {
            origin: document.origin,
        }),
        Some(role) if role == vocabulary.handshake_role => Ok(FrameKind::HandshakeAck),
        Some(role) => Err(DocumentError::UnrecognizedControl(role.to_owned())),
        None => Err(DocumentError::UnrecognizedControl(String::new())),
    }
}

/// Build the client handshake document.
pub(crate) fn handshake_document(
    vocabulary: &ControlVocabulary,
    client_name: &str,
    protocol_version: &str,
) -> Bytes {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <{root} {role}=\"{handshake}\" version=\"{version}\">\
         <{origin}>{name}</{origin}>\
         </{root}>",
        root = vocabulary.control_root,
        role = vocabulary.role_attribute,
        handshake = escape(&vocabulary.handshake_role),
        version = escape(protocol_version),
        origin = vocabulary.origin_element,
        name = escape(client_name),
    );
    Bytes::from(body)
}

/// Build a keep-alive acknowledgment, echoing the server's origin.
pub(crate) fn ping_ack_document(
    vocabulary: &ControlVocabulary,
    client_name: &str,
    protocol_version: &str,
    server_origin: Option<&str>,
) -> Bytes {
    let origin = server_origin.unwrap_or("");
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <{root} {role}=\"{ping}\" version=\"{version}\">\
         <{origin_element}>{origin}</{origin_element}>\
         <{response_element}>{name}</{response_element}>\
         </{root}>",
        root = vocabulary.control_root,
        role = vocabulary.role_attribute,
        ping = escape(&vocabulary.ping_role),
        version = escape(protocol_version),
        origin_element = vocabulary.origin_element,
        origin = escape(origin),
        response_element = vocabulary.response_element,
        name = escape(client_name),
    );
    Bytes::from(body)
}
