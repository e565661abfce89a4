use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};

/// Generates a PEM-encoded certificate request with the given subject common name and SANs.
pub(crate) fn mk_csr(common_name: Option<&str>, sans: Vec<SanType>) -> String {
    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    if let Some(cn) = common_name {
        params.distinguished_name.push(DnType::CommonName, cn);
    }
    params.subject_alt_names = sans;
    serialize(params)
}

/// Signs and PEM-encodes a certificate request built from arbitrary parameters.
pub(crate) fn serialize(params: CertificateParams) -> String {
    let key = KeyPair::generate().expect("key pair must be generated");
    params
        .serialize_request(&key)
        .expect("request must be serialized")
        .pem()
        .expect("request must be PEM-encoded")
}

pub(crate) fn dns(name: &str) -> SanType {
    SanType::DnsName(name.try_into().expect("DNS name must be IA5"))
}
