//! PEM 证书与私钥装载。

use std::{path::Path, sync::Arc};

use flare_core::{FlareError, Result};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// 由内存中的证书链与私钥构造服务端配置。
pub fn server_config(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|err| FlareError::invalid_parameter(format!("tls protocol versions: {err}")))?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|err| FlareError::invalid_parameter(format!("tls certificate: {err}")))
}

/// 由 PEM 文件构造服务端配置。
pub fn server_config_from_pem(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Result<ServerConfig> {
    let chain = CertificateDer::pem_file_iter(cert.as_ref())
        .and_then(|iter| iter.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|err| {
            FlareError::invalid_parameter(format!("{}: {err}", cert.as_ref().display()))
        })?;
    if chain.is_empty() {
        return Err(FlareError::invalid_parameter(format!(
            "{}: no certificates found",
            cert.as_ref().display()
        )));
    }
    let key = PrivateKeyDer::from_pem_file(key.as_ref()).map_err(|err| {
        FlareError::invalid_parameter(format!("{}: {err}", key.as_ref().display()))
    })?;
    server_config(chain, key)
}

/// 只信任给定根证书的客户端配置，测试与内部互联使用。
pub fn client_config(roots: &[CertificateDer<'static>]) -> Result<ClientConfig> {
    let mut store = RootCertStore::empty();
    for root in roots {
        store
            .add(root.clone())
            .map_err(|err| FlareError::invalid_parameter(format!("tls root: {err}")))?;
    }
    Ok(ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|err| FlareError::invalid_parameter(format!("tls protocol versions: {err}")))?
        .with_root_certificates(store)
        .with_no_client_auth())
}
