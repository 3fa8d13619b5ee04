//! XML namespaces used by WS-Management shell messages.

/// An XML namespace with the prefix winrs serializes it under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Prefix used when serializing
    pub prefix: &'static str,
    /// Namespace URI
    pub uri: &'static str,
}

impl Namespace {
    const fn new(prefix: &'static str, uri: &'static str) -> Self {
        Self { prefix, uri }
    }

    /// `xmlns:prefix` attribute name declaring this namespace.
    pub fn xmlns(&self) -> String {
        format!("xmlns:{}", self.prefix)
    }

    /// Qualified name of `local` in this namespace.
    pub fn qualify(&self, local: &str) -> String {
        format!("{}:{}", self.prefix, local)
    }
}

pub const NS_SOAP_ENV: Namespace = Namespace::new("env", "http://www.w3.org/2003/05/soap-envelope");
pub const NS_ADDRESSING: Namespace =
    Namespace::new("a", "http://schemas.xmlsoap.org/ws/2004/08/addressing");
pub const NS_CIMBINDING: Namespace =
    Namespace::new("b", "http://schemas.dmtf.org/wbem/wsman/1/cimbinding.xsd");
pub const NS_ENUM: Namespace =
    Namespace::new("n", "http://schemas.xmlsoap.org/ws/2004/09/enumeration");
pub const NS_TRANSFER: Namespace =
    Namespace::new("x", "http://schemas.xmlsoap.org/ws/2004/09/transfer");
pub const NS_WSMAN_DMTF: Namespace =
    Namespace::new("w", "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd");
pub const NS_WSMAN_MSFT: Namespace =
    Namespace::new("p", "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd");
pub const NS_SCHEMA_INST: Namespace =
    Namespace::new("xsi", "http://www.w3.org/2001/XMLSchema-instance");
pub const NS_WIN_SHELL: Namespace =
    Namespace::new("rsp", "http://schemas.microsoft.com/wbem/wsman/1/windows/shell");
pub const NS_WSMAN_FAULT: Namespace =
    Namespace::new("f", "http://schemas.microsoft.com/wbem/wsman/1/wsmanfault");

/// Namespaces declared on every envelope.
pub const MOST_USED: [Namespace; 5] = [
    NS_SOAP_ENV,
    NS_ADDRESSING,
    NS_WIN_SHELL,
    NS_WSMAN_DMTF,
    NS_WSMAN_MSFT,
];

/// Every namespace winrs knows about.
pub const ALL: [Namespace; 10] = [
    NS_SOAP_ENV,
    NS_ADDRESSING,
    NS_CIMBINDING,
    NS_ENUM,
    NS_TRANSFER,
    NS_WSMAN_DMTF,
    NS_WSMAN_MSFT,
    NS_SCHEMA_INST,
    NS_WIN_SHELL,
    NS_WSMAN_FAULT,
];

/// Resolve a prefix to its namespace.
pub fn lookup(prefix: &str) -> Option<Namespace> {
    ALL.iter().copied().find(|ns| ns.prefix == prefix)
}
