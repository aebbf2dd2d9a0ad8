//! Self-signed certificate handling for HTTPS listeners.
//!
//! Certificates are generated locally, cached in the platform config
//! directory and reused across restarts until they near expiry.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rcgen::{CertificateParams, DistinguishedName, DnType};
use tokio_rustls::TlsAcceptor;

const COMMON_NAME: &str = "local.webdav.filen.io";
const VALIDITY_DAYS: i64 = 365;
// Regenerate a few days before the certificate actually runs out.
const REUSE_DAYS: u64 = 360;

const CERT_FILE: &str = "cert";
const KEY_FILE: &str = "privateKey";
const EXPIRY_FILE: &str = "expiry";

/// `<platform-config>/@filen/webdav`
pub(crate) fn config_base_dir() -> io::Result<PathBuf> {
    let base = dirs::config_dir().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no platform config directory")
    })?;
    Ok(base.join("@filen").join("webdav"))
}

/// Certificate and key as PEM, loaded from the cache or freshly
/// generated.
pub(crate) fn load_or_generate(dir: &Path) -> io::Result<(String, String)> {
    let cert_path = dir.join(CERT_FILE);
    let key_path = dir.join(KEY_FILE);
    let expiry_path = dir.join(EXPIRY_FILE);

    if let (Ok(cert), Ok(key), Ok(expiry)) = (
        std::fs::read_to_string(&cert_path),
        std::fs::read_to_string(&key_path),
        std::fs::read_to_string(&expiry_path),
    ) {
        if let Ok(expiry) = expiry.trim().parse::<u64>() {
            if unix_now() < expiry {
                return Ok((cert, key));
            }
        }
    }

    info!("generating self-signed certificate for {COMMON_NAME}");
    let (cert, key) = generate()?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(&cert_path, &cert)?;
    std::fs::write(&key_path, &key)?;
    let expiry = unix_now() + REUSE_DAYS * 24 * 3600;
    std::fs::write(&expiry_path, expiry.to_string())?;
    Ok((cert, key))
}

fn generate() -> io::Result<(String, String)> {
    let mut params = CertificateParams::new(vec![COMMON_NAME.to_string()]);
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, COMMON_NAME);
    params.distinguished_name = dn;
    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let cert_pem = cert
        .serialize_pem()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let key_pem = cert.serialize_private_key_pem();
    Ok((cert_pem, key_pem))
}

pub(crate) fn acceptor(cert_pem: &str, key_pem: &str) -> io::Result<TlsAcceptor> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_bytes()))?
        .into_iter()
        .map(rustls::Certificate)
        .collect::<Vec<_>>();
    let key = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_pem.as_bytes()))?
        .into_iter()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key in PEM"))?;

    let config = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_cache_reuse() {
        let tmp = tempfile::tempdir().unwrap();
        let (cert1, key1) = load_or_generate(tmp.path()).unwrap();
        assert!(cert1.contains("BEGIN CERTIFICATE"));
        assert!(key1.contains("PRIVATE KEY"));

        // second call must come from the cache
        let (cert2, key2) = load_or_generate(tmp.path()).unwrap();
        assert_eq!(cert1, cert2);
        assert_eq!(key1, key2);

        // a passed expiry forces regeneration
        std::fs::write(tmp.path().join(EXPIRY_FILE), "1").unwrap();
        let (cert3, _) = load_or_generate(tmp.path()).unwrap();
        assert_ne!(cert1, cert3);
    }

    #[test]
    fn acceptor_accepts_generated_pair() {
        let (cert, key) = generate().unwrap();
        acceptor(&cert, &key).unwrap();
    }
}
