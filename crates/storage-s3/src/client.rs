//! AWS SDK client construction.

use aws_config::{BehaviorVersion, sts::AssumeRoleProvider, timeout::TimeoutConfig};
use aws_sdk_s3::{
    Client,
    config::{Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation},
};

use crate::config::S3BackendConfig;

/// Session name reported to STS when assuming a role.
const ROLE_SESSION_NAME: &str = "certstore-storage";

/// Name attached to static credentials in SDK diagnostics.
const STATIC_PROVIDER_NAME: &str = "certstore-static";

/// Builds an S3 client from a validated configuration.
pub(crate) async fn build_client(config: &S3BackendConfig) -> Client {
    if config.uses_deprecated_host() {
        tracing::warn!(
            endpoint = config.endpoint().as_deref().unwrap_or_default(),
            "using deprecated 'host' option, consider switching to 'endpoint'",
        );
    }

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region().to_owned()))
        .timeout_config(TimeoutConfig::builder().connect_timeout(config.connect_timeout()).build());

    if let Some((access_key, secret_key)) = config.static_credentials() {
        tracing::debug!("using static credentials");
        loader = loader.credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            STATIC_PROVIDER_NAME,
        ));
    } else if let Some(profile) = config.profile() {
        tracing::debug!(profile, "using shared config profile");
        loader = loader.profile_name(profile);
    }

    let sdk_config = loader.load().await;
    let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);

    if let Some(role_arn) = config.role_arn() {
        tracing::debug!(role_arn, "assuming role");
        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(ROLE_SESSION_NAME)
            .configure(&sdk_config)
            .build()
            .await;
        builder = builder.credentials_provider(provider);
    }

    if let Some(endpoint) = config.endpoint() {
        // Non-AWS providers often reject the SDK's default request checksums.
        builder = builder
            .endpoint_url(endpoint)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
    }

    if config.use_path_style() {
        builder = builder.force_path_style(true);
    }

    #[cfg(feature = "insecure-tls")]
    {
        if config.insecure() {
            tracing::warn!("TLS certificate verification is disabled; use only for testing");
            builder = insecure::skip_verification(builder);
        }
    }

    Client::from_conf(builder.build())
}

#[cfg(feature = "insecure-tls")]
mod insecure {
    use std::{sync::Arc, time::SystemTime};

    use aws_sdk_s3::config::Builder;
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
    use rustls::{
        Certificate, ClientConfig, ServerName,
        client::{ServerCertVerified, ServerCertVerifier},
    };

    /// Accepts every server certificate.
    struct AcceptAnyCertificate;

    impl ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &Certificate,
            _intermediates: &[Certificate],
            _server_name: &ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: SystemTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }
    }

    pub(super) fn skip_verification(builder: Builder) -> Builder {
        let tls = ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        builder.http_client(HyperClientBuilder::new().build(connector))
    }
}
