//! TLS for the pairing server
//!
//! Browsers only expose the camera to secure origins, so phones scanning a
//! sequence need HTTPS even on a LAN. Certificates are either loaded from
//! PEM files or generated in memory at startup.

use axum_server::tls_rustls::RustlsConfig;
use huepair_core::{Error, Result};
use rcgen::{CertificateParams, DistinguishedName, DnType, Ia5String, KeyPair, SanType};
use sha2::{Digest, Sha256};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::{debug, info};

/// Certificate and key PEM pair plus its fingerprint
#[derive(Debug, Clone)]
pub struct ServerCertificate {
    pub cert_pem: String,
    pub key_pem: String,
    pub fingerprint: String,
}

impl ServerCertificate {
    /// Generate a fresh self-signed certificate
    pub fn self_signed(hostnames: &[String]) -> Result<Self> {
        let (cert_pem, key_pem) = generate_self_signed_cert(hostnames)?;
        let fingerprint = calculate_cert_fingerprint(&cert_pem);
        info!("Generated self-signed certificate ({})", fingerprint);
        Ok(Self {
            cert_pem,
            key_pem,
            fingerprint,
        })
    }

    /// Read a certificate and key from PEM files
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = std::fs::read_to_string(cert_path)?;
        let key_pem = std::fs::read_to_string(key_path)?;
        let fingerprint = calculate_cert_fingerprint(&cert_pem);
        info!("Loaded certificate from {:?}", cert_path);
        Ok(Self {
            cert_pem,
            key_pem,
            fingerprint,
        })
    }

    pub async fn rustls_config(&self) -> Result<RustlsConfig> {
        create_rustls_config(&self.cert_pem, &self.key_pem).await
    }
}

/// Generate a self-signed certificate for the given hostnames/IPs
pub fn generate_self_signed_cert(hostnames: &[String]) -> Result<(String, String)> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "HuePair");
    dn.push(DnType::OrganizationName, "HuePair");
    params.distinguished_name = dn;

    let localhost: Ia5String = "localhost".try_into().map_err(tls_error)?;
    let mut san_list = vec![
        SanType::DnsName(localhost),
        SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)),
    ];

    for hostname in hostnames {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            san_list.push(SanType::IpAddress(ip));
        } else if let Ok(dns) = hostname.as_str().try_into() {
            san_list.push(SanType::DnsName(dns));
        } else {
            debug!("Skipping invalid certificate hostname {}", hostname);
        }
    }
    params.subject_alt_names = san_list;

    let key_pair = KeyPair::generate().map_err(tls_error)?;
    let cert = params.self_signed(&key_pair).map_err(tls_error)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// SHA-256 fingerprint of a certificate as colon-separated hex pairs
pub fn calculate_cert_fingerprint(cert_pem: &str) -> String {
    let digest = Sha256::digest(cert_pem.as_bytes());
    digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Create RustlsConfig from PEM strings
pub async fn create_rustls_config(cert_pem: &str, key_pem: &str) -> Result<RustlsConfig> {
    let config =
        RustlsConfig::from_pem(cert_pem.as_bytes().to_vec(), key_pem.as_bytes().to_vec()).await?;
    Ok(config)
}

fn tls_error(e: rcgen::Error) -> Error {
    Error::Tls(e.to_string())
}
