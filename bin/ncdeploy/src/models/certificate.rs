use openssl::nid::Nid;
use openssl::x509::{X509, X509NameRef};
use openssl::asn1::Asn1Time;

use ncdeploy_error::io::{IoError, IoResult};

/// Certificate and key files the ACME client maintains for a domain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertPaths {
  pub fullchain: String,
  pub privkey: String,
}

impl CertPaths {
  pub fn new(cert_dir: &str, domain: &str) -> Self {
    let dir = cert_dir.trim_end_matches('/');
    Self {
      fullchain: format!("{dir}/{domain}/fullchain.pem"),
      privkey: format!("{dir}/{domain}/privkey.pem"),
    }
  }
}

/// What we can observe of an issued certificate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
  pub domain: String,
  pub issuer: String,
  /// `notAfter` as printed by openssl eg: `Jan 17 08:00:00 2027 GMT`
  pub expiry: String,
  /// Whole days until expiry, negative once expired
  pub days_remaining: i32,
}

fn name_entry(name: &X509NameRef, nid: Nid) -> Option<String> {
  name
    .entries_by_nid(nid)
    .next()
    .and_then(|entry| entry.data().as_utf8().ok())
    .map(|data| data.to_string())
}

impl Certificate {
  /// Parse the leaf certificate of a PEM chain
  pub fn from_pem(domain: &str, pem: &[u8]) -> IoResult<Self> {
    let map_err = |err: openssl::error::ErrorStack| {
      IoError::invalid_data(format!("Certificate of {domain}"), err)
    };
    let cert = X509::from_pem(pem).map_err(map_err)?;
    let issuer = name_entry(cert.issuer_name(), Nid::ORGANIZATIONNAME)
      .or_else(|| name_entry(cert.issuer_name(), Nid::COMMONNAME))
      .unwrap_or_else(|| "unknown".to_owned());
    let now = Asn1Time::days_from_now(0).map_err(map_err)?;
    let diff = now.diff(cert.not_after()).map_err(map_err)?;
    Ok(Self {
      domain: domain.to_owned(),
      issuer,
      expiry: cert.not_after().to_string(),
      days_remaining: diff.days,
    })
  }
}

impl std::fmt::Display for Certificate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{} issued by {} expires {} ({} days)",
      self.domain, self.issuer, self.expiry, self.days_remaining
    )
  }
}

/// Outcome of a successful tls bootstrap
#[derive(Clone, Debug)]
pub struct TlsReport {
  pub domain: String,
  pub certificate: Certificate,
  /// The vhost was already https, it has only been written again
  pub reasserted: bool,
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  use openssl::hash::MessageDigest;
  use openssl::pkey::PKey;
  use openssl::ec::{EcGroup, EcKey};
  use openssl::x509::{X509Builder, X509NameBuilder};

  /// Self signed certificate valid for `days`
  pub(crate) fn gen_test_cert(issuer: &str, days: u32) -> Vec<u8> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
    let mut name = X509NameBuilder::new().unwrap();
    name
      .append_entry_by_nid(Nid::ORGANIZATIONNAME, issuer)
      .unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, "R3").unwrap();
    let name = name.build();
    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    let not_before = Asn1Time::days_from_now(0).unwrap();
    builder.set_not_before(&not_before).unwrap();
    let not_after = Asn1Time::days_from_now(days).unwrap();
    builder.set_not_after(&not_after).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    builder.build().to_pem().unwrap()
  }

  #[test]
  fn cert_paths() {
    let paths = CertPaths::new("/etc/letsencrypt/live/", "api.example.com");
    assert_eq!(
      paths.fullchain,
      "/etc/letsencrypt/live/api.example.com/fullchain.pem"
    );
    assert_eq!(
      paths.privkey,
      "/etc/letsencrypt/live/api.example.com/privkey.pem"
    );
  }

  #[test]
  fn parse_pem() {
    let pem = gen_test_cert("Let's Encrypt", 90);
    let cert = Certificate::from_pem("api.example.com", &pem).unwrap();
    assert_eq!(cert.domain, "api.example.com");
    assert_eq!(cert.issuer, "Let's Encrypt");
    assert!((89..=90).contains(&cert.days_remaining));
    assert!(cert.expiry.ends_with("GMT"));
  }

  #[test]
  fn parse_garbage() {
    assert!(Certificate::from_pem("api.example.com", b"nope").is_err());
  }
}
