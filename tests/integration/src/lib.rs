//! Fixtures for end-to-end federation scenarios.

use std::sync::Arc;

use sf_core::FederationConfig;
use sf_crypto::{Certificate, KeyPairCapability, SigningKey};
use sf_saml::bindings::OutboundMessage;
use sf_trust::attributes::{AttributeConsumingService, AttributeProvider, Principal};
use sf_trust::registry::NoFetch;
use sf_trust::roles::{
    IdentityAttributeProviderRole, IdentityProviderRole, IdpSettings, ServiceProviderRole, SpSettings,
};
use sf_trust::Authority;

pub const IDP: &str = "https://idp.example.org";
pub const SP: &str = "https://sp.example.org";

/// Initializes test logging once; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sf_trust=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// A P-256 key pair with a self-signed certificate for `host`.
pub fn capability(host: &str) -> anyhow::Result<KeyPairCapability> {
    let key_pair = rcgen::KeyPair::generate()?;
    let params = rcgen::CertificateParams::new(vec![host.to_string()])?;
    let cert = params.self_signed(&key_pair)?;
    Ok(KeyPairCapability::new(
        SigningKey::from_der(&key_pair.serialize_der())?,
        Certificate::from_der(cert.der())?,
    )?)
}

/// Default configuration for `entity_id`, served from the same URL.
pub fn config(entity_id: &str) -> FederationConfig {
    FederationConfig::new(entity_id, entity_id)
}

/// An authority whose partners are registered by hand.
pub fn authority(config: FederationConfig) -> anyhow::Result<Authority> {
    let host = config.authority.entity_id.trim_start_matches("https://").to_string();
    Ok(Authority::builder(config, Arc::new(capability(&host)?))
        .with_fetcher(Arc::new(NoFetch))
        .build()?)
}

/// Registers each authority's published metadata with the other.
pub fn exchange_metadata(a: &Authority, b: &Authority) -> anyhow::Result<()> {
    a.upsert_entity(&b.publish_metadata()?.document)?;
    b.upsert_entity(&a.publish_metadata()?.document)?;
    Ok(())
}

/// How to set up a [`Federation`].
#[derive(Default)]
pub struct FederationOptions {
    pub idp: IdpSettings,
    pub sp: SpSettings,
    pub services: Vec<AttributeConsumingService>,
    pub provider: Option<AttributeProvider>,
    pub sp_clock_skew_secs: Option<u64>,
    pub sp_relay_state_ttl_secs: Option<u64>,
}

pub enum IdpRole {
    Plain(Arc<IdentityProviderRole>),
    WithAttributes(Arc<IdentityAttributeProviderRole>),
}

/// Authority `A` playing the IdP and authority `B` playing the SP, trusting
/// each other.
pub struct Federation {
    pub idp_authority: Authority,
    pub sp_authority: Authority,
    pub idp_role: IdpRole,
    pub sp: Arc<ServiceProviderRole>,
}

impl Federation {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_options(FederationOptions::default())
    }

    pub fn with_options(options: FederationOptions) -> anyhow::Result<Self> {
        init_tracing();
        let idp_authority = authority(config(IDP))?;
        let idp_role = match options.provider {
            Some(provider) => {
                let role = Arc::new(IdentityAttributeProviderRole::new(
                    &idp_authority,
                    options.idp,
                    provider,
                )?);
                idp_authority.register_role(role.clone())?;
                IdpRole::WithAttributes(role)
            }
            None => {
                let role = Arc::new(IdentityProviderRole::new(&idp_authority, options.idp)?);
                idp_authority.register_role(role.clone())?;
                IdpRole::Plain(role)
            }
        };

        let mut sp_config = config(SP);
        if let Some(skew) = options.sp_clock_skew_secs {
            sp_config.trust.clock_skew_secs = skew;
        }
        if let Some(ttl) = options.sp_relay_state_ttl_secs {
            sp_config.relay_state.ttl_secs = ttl;
        }
        let sp_authority = authority(sp_config)?;
        let sp = Arc::new(ServiceProviderRole::new(&sp_authority, options.sp, options.services)?);
        sp_authority.register_role(sp.clone())?;

        exchange_metadata(&idp_authority, &sp_authority)?;
        Ok(Self {
            idp_authority,
            sp_authority,
            idp_role,
            sp,
        })
    }

    pub fn idp(&self) -> &IdentityProviderRole {
        match &self.idp_role {
            IdpRole::Plain(role) => role,
            IdpRole::WithAttributes(role) => role.identity_provider(),
        }
    }

    /// Runs the SP-initiated flow up to the IdP's Response.
    ///
    /// Returns the Response to post back and the RelayState token.
    pub async fn login(
        &self,
        relay_target: &str,
        service_index: Option<u16>,
        principal: &dyn Principal,
    ) -> anyhow::Result<(OutboundMessage, String)> {
        let (request, token) = self
            .sp
            .build_authn_request(IDP, relay_target, service_index)
            .await?;
        let validated = self.idp().validate_authn_request(&request.to_inbound()).await?;
        let response = self.idp().build_response(&validated, principal)?;
        Ok((response, token))
    }
}
