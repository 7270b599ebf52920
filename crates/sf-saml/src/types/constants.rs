//! SAML 2.0 namespaces and identifier URIs.

/// SAML 2.0 assertion namespace.
pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";

/// SAML 2.0 protocol namespace.
pub const SAMLP_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// SAML 2.0 metadata namespace.
pub const METADATA_NS: &str = "urn:oasis:names:tc:SAML:2.0:metadata";

/// XML-DSig namespace.
pub const XMLDSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// XML Schema instance namespace.
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML Schema namespace.
pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Declares a fieldless enum whose variants map one-to-one onto URIs.
macro_rules! uri_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $uri:literal,)+
        }
    ) => {
        $(#[$meta])*
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Returns the URI.
            #[must_use]
            pub const fn uri(&self) -> &'static str {
                match self {
                    $(Self::$variant => $uri,)+
                }
            }

            /// Looks a variant up by URI.
            #[must_use]
            pub fn from_uri(uri: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.uri() == uri)
            }
        }
    };
}

uri_enum! {
    /// Protocol bindings.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub enum SamlBinding {
        /// HTTP POST.
        HttpPost => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST",
        /// HTTP Redirect.
        HttpRedirect => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect",
        /// HTTP Artifact; recognized in metadata but never used to send.
        HttpArtifact => "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact",
    }
}

uri_enum! {
    /// Name identifier formats a role can issue or request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub enum NameIdFormat {
        #[default]
        /// No particular format.
        Unspecified => "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified",
        /// An email address.
        Email => "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress",
        /// Opaque and stable per SP.
        Persistent => "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent",
        /// Opaque and single-use.
        Transient => "urn:oasis:names:tc:SAML:2.0:nameid-format:transient",
    }
}

uri_enum! {
    /// Authentication context classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub enum AuthnContextClass {
        #[default]
        /// Not stated.
        Unspecified => "urn:oasis:names:tc:SAML:2.0:ac:classes:unspecified",
        /// Password.
        Password => "urn:oasis:names:tc:SAML:2.0:ac:classes:Password",
        /// Password over TLS.
        PasswordProtectedTransport => "urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport",
    }
}

/// Top-level status codes.
pub mod status_codes {
    /// The request succeeded.
    pub const SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
    /// The requester is at fault.
    pub const REQUESTER: &str = "urn:oasis:names:tc:SAML:2.0:status:Requester";
    /// The responder is at fault.
    pub const RESPONDER: &str = "urn:oasis:names:tc:SAML:2.0:status:Responder";
}

/// Second-level status codes.
pub mod sub_status_codes {
    /// The requested NameID format cannot be issued.
    pub const INVALID_NAMEID_POLICY: &str = "urn:oasis:names:tc:SAML:2.0:status:InvalidNameIDPolicy";
    /// The request was refused.
    pub const REQUEST_DENIED: &str = "urn:oasis:names:tc:SAML:2.0:status:RequestDenied";
    /// A referenced resource, such as a service index, is unknown.
    pub const RESOURCE_NOT_RECOGNIZED: &str =
        "urn:oasis:names:tc:SAML:2.0:status:ResourceNotRecognized";
}

/// Attribute `NameFormat` URIs.
pub mod attrname_formats {
    /// Names are URIs.
    pub const URI: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:uri";
    /// Names are simple strings.
    pub const BASIC: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:basic";
    /// Assumed when no format is given.
    pub const UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:2.0:attrname-format:unspecified";
}

/// Signature reference transforms.
pub mod transforms {
    /// Enveloped signature.
    pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";
}

/// Canonicalization algorithms.
pub mod canonicalization_algorithms {
    /// Exclusive C14N without comments; the only one accepted.
    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

/// Subject confirmation methods.
pub mod confirmation_methods {
    /// Bearer.
    pub const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
}
