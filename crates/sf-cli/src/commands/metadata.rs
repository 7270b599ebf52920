//! Metadata commands.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use sf_core::FederationConfig;
use sf_crypto::KeyPairCapability;
use sf_relay_redis::{RedisConfig, RedisRelayStateStore};
use sf_saml::metadata::{EntityDescriptor, KeyDescriptor};
use sf_trust::roles::{IdentityProviderRole, IdpSettings, ServiceProviderRole, SpSettings};
use sf_trust::strategy::StrategyRegistry;
use sf_trust::Authority;

use crate::cli::MetadataCommand;
use crate::output::{field, heading, output_single, success, warning, OutputFormat};
use crate::{CliError, CliResult};

/// Runs a metadata command.
pub async fn run_metadata(cmd: MetadataCommand, format: OutputFormat) -> CliResult<()> {
    match cmd {
        MetadataCommand::Publish {
            config,
            idp,
            sp,
            out,
        } => publish(config.as_deref(), idp, sp, out.as_deref()).await,
        MetadataCommand::Inspect { file } => inspect(&file, format),
    }
}

async fn publish(config: Option<&Path>, idp: bool, sp: bool, out: Option<&Path>) -> CliResult<()> {
    if !idp && !sp {
        return Err(CliError::InvalidArgument(
            "choose at least one of --idp and --sp".to_string(),
        ));
    }
    let config = match config {
        Some(path) => FederationConfig::from_file(path)?,
        None => FederationConfig::from_env()?,
    };
    let crypto = load_crypto(&config)?;

    let strategies = StrategyRegistry::new();
    if let Some(redis) = RedisConfig::from_store_config(&config.relay_state.store) {
        let store = RedisRelayStateStore::connect(redis).await?;
        strategies.register_relay_store("redis", Arc::new(store));
    }
    let authority = Authority::builder(config, Arc::new(crypto))
        .with_strategies(strategies)
        .build()?;

    if idp {
        let role = IdentityProviderRole::new(&authority, IdpSettings::default())?;
        authority.register_role(Arc::new(role))?;
    }
    if sp {
        let role = ServiceProviderRole::new(&authority, SpSettings::default(), Vec::new())?;
        authority.register_role(Arc::new(role))?;
    }

    let published = authority.publish_metadata()?;
    tracing::info!(
        entity_id = %authority.entity_id(),
        valid_until = %published.valid_until,
        "metadata published"
    );
    match out {
        Some(path) => {
            std::fs::write(path, &published.document)?;
            success(&format!(
                "metadata for {} written to {}",
                authority.entity_id(),
                path.display()
            ));
        }
        None => println!("{}", published.document),
    }
    Ok(())
}

fn load_crypto(config: &FederationConfig) -> CliResult<KeyPairCapability> {
    let crypto = &config.crypto;
    let (Some(key), Some(certificate)) = (&crypto.private_key_path, &crypto.certificate_path) else {
        return Err(CliError::InvalidArgument(
            "crypto.private_key_path and crypto.certificate_path are required".to_string(),
        ));
    };
    Ok(KeyPairCapability::from_files(
        key,
        certificate,
        crypto.next_certificate_path.as_deref(),
    )?)
}

fn inspect(file: &Path, format: OutputFormat) -> CliResult<()> {
    let document = std::fs::read_to_string(file)?;
    let descriptor = EntityDescriptor::parse(&document)?;
    let summary = summarize(&descriptor);
    output_single(&summary, format, |s| print_summary(s, Utc::now()))
}

/// What `sf metadata inspect` reports about a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataSummary {
    /// Entity ID.
    pub entity_id: String,
    /// End of validity, if declared.
    pub valid_until: Option<DateTime<Utc>>,
    /// Role descriptors in document order.
    pub roles: Vec<RoleSummary>,
}

/// One role descriptor of a [`MetadataSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSummary {
    /// `idp` or `sp`.
    pub role: &'static str,
    /// Whether the role signs or wants signed messages, as declared.
    pub signing: Vec<String>,
    /// Protocol endpoints.
    pub endpoints: Vec<EndpointSummary>,
    /// Name ID formats.
    pub name_id_formats: Vec<String>,
    /// Attributes offered (IdP) or requested (SP).
    pub attributes: Vec<String>,
    /// Published certificates.
    pub certificates: Vec<CertificateSummary>,
}

/// An endpoint of a [`RoleSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSummary {
    /// Element name, e.g. `SingleSignOnService`.
    pub service: &'static str,
    /// Binding URI.
    pub binding: String,
    /// Endpoint URL.
    pub location: String,
    /// Index, for indexed endpoints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u16>,
    /// Whether the endpoint is the declared default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// A certificate of a [`RoleSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateSummary {
    /// `signing`, `encryption` or `any`.
    pub usage: &'static str,
    /// Subject distinguished name.
    pub subject: String,
    /// Start of validity.
    pub not_before: DateTime<Utc>,
    /// End of validity.
    pub not_after: DateTime<Utc>,
    /// SHA-256 fingerprint.
    pub fingerprint: String,
}

fn certificates(keys: &[KeyDescriptor]) -> Vec<CertificateSummary> {
    keys.iter()
        .map(|k| CertificateSummary {
            usage: k.usage.map_or("any", |u| u.as_str()),
            subject: k.certificate.subject().to_string(),
            not_before: k.certificate.not_before(),
            not_after: k.certificate.not_after(),
            fingerprint: k.certificate.fingerprint(),
        })
        .collect()
}

fn declared(flag: Option<bool>, name: &str) -> Option<String> {
    flag.map(|v| format!("{name}={v}"))
}

/// Summarizes a parsed metadata document.
#[must_use]
pub fn summarize(descriptor: &EntityDescriptor) -> MetadataSummary {
    let mut roles = Vec::new();
    if let Some(idp) = &descriptor.idp_sso {
        let endpoints = idp
            .single_sign_on_services
            .iter()
            .map(|e| ("SingleSignOnService", e))
            .chain(idp.single_logout_services.iter().map(|e| ("SingleLogoutService", e)))
            .map(|(service, e)| EndpointSummary {
                service,
                binding: e.binding.clone(),
                location: e.location.clone(),
                index: None,
                is_default: None,
            })
            .collect();
        roles.push(RoleSummary {
            role: "idp",
            signing: declared(idp.want_authn_requests_signed, "WantAuthnRequestsSigned")
                .into_iter()
                .collect(),
            endpoints,
            name_id_formats: idp.name_id_formats.clone(),
            attributes: idp
                .attributes
                .iter()
                .map(|a| a.friendly_name.clone().unwrap_or_else(|| a.name.clone()))
                .collect(),
            certificates: certificates(&idp.key_descriptors),
        });
    }
    if let Some(sp) = &descriptor.sp_sso {
        let mut endpoints: Vec<EndpointSummary> = sp
            .assertion_consumer_services
            .iter()
            .map(|acs| EndpointSummary {
                service: "AssertionConsumerService",
                binding: acs.endpoint.binding.clone(),
                location: acs.endpoint.location.clone(),
                index: Some(acs.index),
                is_default: acs.is_default,
            })
            .collect();
        endpoints.extend(sp.single_logout_services.iter().map(|e| EndpointSummary {
            service: "SingleLogoutService",
            binding: e.binding.clone(),
            location: e.location.clone(),
            index: None,
            is_default: None,
        }));
        roles.push(RoleSummary {
            role: "sp",
            signing: [
                declared(sp.authn_requests_signed, "AuthnRequestsSigned"),
                declared(sp.want_assertions_signed, "WantAssertionsSigned"),
            ]
            .into_iter()
            .flatten()
            .collect(),
            endpoints,
            name_id_formats: sp.name_id_formats.clone(),
            attributes: sp
                .attribute_consuming_services
                .iter()
                .flat_map(|service| {
                    service.requested_attributes.iter().map(move |a| {
                        let name = a.friendly_name.as_deref().unwrap_or(&a.name);
                        let required = if a.is_required == Some(true) { " (required)" } else { "" };
                        format!("[{}] {name}{required}", service.index)
                    })
                })
                .collect(),
            certificates: certificates(&sp.key_descriptors),
        });
    }
    MetadataSummary {
        entity_id: descriptor.entity_id.clone(),
        valid_until: descriptor.valid_until,
        roles,
    }
}

fn print_summary(summary: &MetadataSummary, now: DateTime<Utc>) {
    heading(&summary.entity_id);
    match summary.valid_until {
        Some(until) if until <= now => field("valid until", format!("{until} {}", "(expired)".red())),
        Some(until) => field("valid until", until),
        None => field("valid until", "-"),
    }
    if summary.roles.is_empty() {
        warning("no SAML 2.0 role descriptor");
    }
    for role in &summary.roles {
        println!();
        heading(&format!("{} descriptor", role.role.to_uppercase()));
        for flag in &role.signing {
            field("signing", flag);
        }
        for endpoint in &role.endpoints {
            let index = endpoint
                .index
                .map(|i| format!(" [{i}{}]", if endpoint.is_default == Some(true) { ", default" } else { "" }))
                .unwrap_or_default();
            field(endpoint.service, format!("{}{index}", endpoint.location));
            field("binding", endpoint.binding.dimmed());
        }
        for format in &role.name_id_formats {
            field("NameID", format);
        }
        for attribute in &role.attributes {
            field("attribute", attribute);
        }
        for certificate in &role.certificates {
            let expired = certificate.not_after <= now;
            field("certificate", format!("{} ({})", certificate.subject, certificate.usage));
            let validity = format!("{} .. {}", certificate.not_before, certificate.not_after);
            field("validity", if expired { validity.red() } else { validity.normal() });
        }
    }
}
