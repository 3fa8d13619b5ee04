//! Fluent construction of the WS-Addressing / WS-Management SOAP header.

use super::message::{Element, SoapMessage};
use super::namespace::{NS_ADDRESSING, NS_SOAP_ENV, NS_WSMAN_DMTF, NS_WSMAN_MSFT};

/// Anonymous reply-to role address.
pub const ANONYMOUS_ROLE: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// Values collected by a [`HeaderBuilder`] before they are written out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    pub to: Option<String>,
    pub reply_to: Option<String>,
    pub max_envelope_size: Option<u32>,
    pub message_id: Option<String>,
    pub locale: Option<String>,
    pub timeout: Option<String>,
    pub action: Option<String>,
    pub resource_uri: Option<String>,
    pub shell_id: Option<String>,
    pub options: Vec<(String, String)>,
}

/// Generate a fresh WS-Addressing message id (`uuid:<v4>`).
pub fn generate_message_id() -> String {
    format!("uuid:{}", uuid::Uuid::new_v4().to_string().to_uppercase())
}

/// Fluent header configuration bound to a message.
///
/// ```rust
/// use winrs::soap::SoapMessage;
///
/// let mut message = SoapMessage::new();
/// message
///     .header()
///     .to("http://localhost:5985/wsman")
///     .action("http://schemas.xmlsoap.org/ws/2004/09/transfer/Create")
///     .build();
/// assert!(message.to_xml().contains("<a:To>http://localhost:5985/wsman</a:To>"));
/// ```
pub struct HeaderBuilder<'a> {
    message: &'a mut SoapMessage,
}

impl<'a> HeaderBuilder<'a> {
    pub(super) fn new(message: &'a mut SoapMessage) -> Self {
        Self { message }
    }

    fn fields(&mut self) -> &mut HeaderFields {
        self.message.header_fields_mut()
    }

    /// Destination URL (`a:To`).
    pub fn to(mut self, uri: impl Into<String>) -> Self {
        self.fields().to = Some(uri.into());
        self
    }

    /// Reply-to address (`a:ReplyTo/a:Address`).
    pub fn reply_to(mut self, uri: impl Into<String>) -> Self {
        self.fields().reply_to = Some(uri.into());
        self
    }

    /// Reply to the anonymous role.
    pub fn reply_to_anonymous(self) -> Self {
        self.reply_to(ANONYMOUS_ROLE)
    }

    /// Largest envelope the server may send back (`w:MaxEnvelopeSize`).
    pub fn max_envelope_size(mut self, size: u32) -> Self {
        self.fields().max_envelope_size = Some(size);
        self
    }

    /// Message id (`a:MessageID`).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.fields().message_id = Some(id.into());
        self
    }

    /// Locale (`w:Locale` and `p:DataLocale`).
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.fields().locale = Some(locale.into());
        self
    }

    /// Operation timeout as an ISO-8601 duration (`w:OperationTimeout`).
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.fields().timeout = Some(timeout.into());
        self
    }

    /// Action URI (`a:Action`).
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.fields().action = Some(action.into());
        self
    }

    /// Resource URI (`w:ResourceURI`).
    pub fn resource_uri(mut self, uri: impl Into<String>) -> Self {
        self.fields().resource_uri = Some(uri.into());
        self
    }

    /// Shell id selector (`w:SelectorSet/w:Selector[@Name='ShellId']`).
    pub fn shell_id(mut self, shell_id: impl Into<String>) -> Self {
        self.fields().shell_id = Some(shell_id.into());
        self
    }

    /// Add a named option (`w:OptionSet/w:Option[@Name]`).
    pub fn add_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields().options.push((name.into(), value.into()));
        self
    }

    /// Write the collected header values into the envelope.
    ///
    /// Only the first call has an effect.
    pub fn build(self) -> &'a mut SoapMessage {
        let fields = self.message.header_fields().cloned().unwrap_or_default();
        let message = self.message;
        let Some(header) = message.create_header_element() else {
            return message;
        };

        if let Some(to) = &fields.to {
            text_child(message, header, "To", NS_ADDRESSING, to);
        }
        if let Some(reply_to) = &fields.reply_to {
            let reply = message.create_element(header, "ReplyTo", NS_ADDRESSING);
            let address = must_understand(message, reply, "Address", NS_ADDRESSING, true);
            message.set_content(address, reply_to.as_str());
        }
        if let Some(size) = fields.max_envelope_size {
            let el = must_understand(message, header, "MaxEnvelopeSize", NS_WSMAN_DMTF, true);
            message.set_content(el, size.to_string());
        }
        if let Some(timeout) = &fields.timeout {
            text_child(message, header, "OperationTimeout", NS_WSMAN_DMTF, timeout);
        }
        if let Some(id) = &fields.message_id {
            text_child(message, header, "MessageID", NS_ADDRESSING, id);
        }
        if let Some(locale) = &fields.locale {
            let el = must_understand(message, header, "Locale", NS_WSMAN_DMTF, false);
            message.set_attr(el, "xml:lang", locale.as_str());
            let el = must_understand(message, header, "DataLocale", NS_WSMAN_MSFT, false);
            message.set_attr(el, "xml:lang", locale.as_str());
        }
        if let Some(action) = &fields.action {
            let el = must_understand(message, header, "Action", NS_ADDRESSING, true);
            message.set_content(el, action.as_str());
        }
        if let Some(shell_id) = &fields.shell_id {
            let set = message.create_element(header, "SelectorSet", NS_WSMAN_DMTF);
            let selector = message.create_element(set, "Selector", NS_WSMAN_DMTF);
            message.set_attr(selector, "Name", "ShellId");
            message.set_content(selector, shell_id.as_str());
        }
        if let Some(uri) = &fields.resource_uri {
            let el = must_understand(message, header, "ResourceURI", NS_WSMAN_DMTF, true);
            message.set_content(el, uri.as_str());
        }
        if !fields.options.is_empty() {
            let set = message.create_element(header, "OptionSet", NS_WSMAN_DMTF);
            for (name, value) in &fields.options {
                let option = message.create_element(set, "Option", NS_WSMAN_DMTF);
                message.set_attr(option, "Name", name.as_str());
                message.set_content(option, value.as_str());
            }
        }

        message
    }
}

fn text_child(
    message: &mut SoapMessage,
    parent: Element,
    name: &str,
    ns: super::namespace::Namespace,
    content: &str,
) -> Element {
    let el = message.create_element(parent, name, ns);
    message.set_content(el, content);
    el
}

fn must_understand(
    message: &mut SoapMessage,
    parent: Element,
    name: &str,
    ns: super::namespace::Namespace,
    value: bool,
) -> Element {
    let el = message.create_element(parent, name, ns);
    message.set_attr(el, &NS_SOAP_ENV.qualify("mustUnderstand"), value.to_string());
    el
}
