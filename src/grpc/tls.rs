// TLS configuration for service channels.

use anyhow::{Context, Result};
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::config::services::TlsSettings;

/// Build the channel TLS configuration from a service's `tls:` block.
///
/// `cert_file` becomes the CA pool for server verification, `cert_config`
/// adds a client identity for mutual auth, `server_name` overrides the
/// SNI / authority used during the handshake.
pub fn build_client_tls(settings: &TlsSettings) -> Result<ClientTlsConfig> {
    let mut tls = ClientTlsConfig::new();

    if let Some(domain) = &settings.server_name {
        tls = tls.domain_name(domain.as_str());
    }

    if let Some(ca_path) = &settings.cert_file {
        let ca_pem = std::fs::read_to_string(ca_path).context("failed to read the CA certificate")?;
        tls = tls.ca_certificate(Certificate::from_pem(ca_pem));
    }

    if let Some(cert_config) = &settings.cert_config {
        let cert_pem = std::fs::read_to_string(&cert_config.cert)
            .context("failed to read the client certificate")?;
        let key_pem =
            std::fs::read_to_string(&cert_config.key).context("failed to read the client key")?;
        tls = tls.identity(Identity::from_pem(cert_pem, key_pem));
    }

    Ok(tls)
}
