//! Builds a `rustls::ClientConfig` from a [`Context`]'s trust/credential
//! material. Grounded on kube-client's `client/tls.rs` `rustls_tls` module,
//! updated for the rustls 0.23 builder API.

use std::sync::Arc;

use kubescope_core::{AuthConfig, Context, TrustMaterial};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read CA material from {0:?}: {1}")]
    ReadCa(String, std::io::Error),
    #[error("failed to parse CA certificate(s): {0}")]
    ParseCa(std::io::Error),
    #[error("failed to read client certificate material: {0}")]
    ReadClientCert(std::io::Error),
    #[error("client certificate PEM contains no certificates")]
    MissingCertificate,
    #[error("client certificate PEM contains no usable private key")]
    MissingPrivateKey,
    #[error("failed to build TLS client config: {0}")]
    BuildConfig(#[from] rustls::Error),
}

/// Load a `TrustMaterial` into DER-encoded root certificates, reading from
/// disk for the `Path` variant.
fn load_ca_ders(trust: &TrustMaterial) -> Result<Option<Vec<CertificateDer<'static>>>, Error> {
    let pem_bytes = match trust {
        TrustMaterial::SystemDefault => return Ok(None),
        TrustMaterial::Inline(bytes) => bytes.clone(),
        TrustMaterial::Path(path) => {
            std::fs::read(path).map_err(|e| Error::ReadCa(path.clone(), e))?
        }
    };

    let mut reader = std::io::Cursor::new(pem_bytes);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::ParseCa)?;
    Ok(Some(certs))
}

/// Parse a client certificate + private key PEM blob (concatenated, as
/// `client-certificate-data`/`client-key-data` typically are once joined).
fn parse_client_identity(
    cert_pem: &[u8],
    key_pem: &[u8],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), Error> {
    let mut cert_reader = std::io::Cursor::new(cert_pem);
    let chain = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::ReadClientCert)?;
    if chain.is_empty() {
        return Err(Error::MissingCertificate);
    }

    let mut key_reader = std::io::Cursor::new(key_pem);
    let key = rustls_pemfile::private_key(&mut key_reader)
        .map_err(Error::ReadClientCert)?
        .ok_or(Error::MissingPrivateKey)?;

    Ok((chain, key))
}

fn read_material(trust: &TrustMaterial) -> Result<Vec<u8>, Error> {
    match trust {
        TrustMaterial::Inline(bytes) => Ok(bytes.clone()),
        TrustMaterial::Path(path) => std::fs::read(path).map_err(|e| Error::ReadCa(path.clone(), e)),
        TrustMaterial::SystemDefault => Ok(Vec::new()),
    }
}

/// Build a `rustls::ClientConfig` for connecting to `context.cluster`, with
/// client-certificate auth layered in if `context.user.auth` calls for it.
pub fn client_config(context: &Context) -> Result<rustls::ClientConfig, Error> {
    let roots = load_ca_ders(&context.cluster.ca)?;
    let builder = match roots {
        Some(certs) => {
            let mut store = rustls::RootCertStore::empty();
            for cert in certs {
                // Malformed individual entries are skipped rather than
                // failing the whole connection; `added` reports how many
                // made it in in case every single one was bad.
                let _ = store.add(cert);
            }
            rustls::ClientConfig::builder().with_root_certificates(store)
        }
        None => {
            let mut store = rustls::RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = store.add(cert);
            }
            rustls::ClientConfig::builder().with_root_certificates(store)
        }
    };

    let config = match &context.user.auth {
        AuthConfig::ClientCertificate { cert, key } => {
            let cert_pem = read_material(cert)?;
            let key_pem = read_material(key)?;
            let (chain, key) = parse_client_identity(&cert_pem, &key_pem)?;
            builder.with_client_auth_cert(chain, key)?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(config)
}
