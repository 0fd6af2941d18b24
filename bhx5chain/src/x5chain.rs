// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use bherror::traits::{ErrorContext as _, ForeignError as _};
use openssl::{
    asn1::{Asn1Time, Asn1TimeRef},
    error::ErrorStack,
    nid::Nid,
    pkey::{PKey, Public},
    stack::Stack,
    x509::{
        store::{X509Store, X509StoreBuilder},
        verify::X509VerifyFlags,
        X509StoreContext, X509,
    },
};

use crate::{Error, Result};

/// The `x5chain` as defined in [RFC 9360][1].
///
/// The certificates are ordered starting with the certificate containing the end-entity key
/// followed by the certificate that signed it, and so on, as stated in [RFC 9360][1].
///
/// All methods of this type that return an [`Error`] do so in case the `x5chain` is invalid.
///
/// [1]: <https://www.rfc-editor.org/rfc/rfc9360.html#section-2-5.4.1>
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X5Chain {
    leaf: X509,
    intermediates: Vec<X509>,
}

impl X5Chain {
    /// Create a new [`X5Chain`].
    ///
    /// The chain **MUST BE** ordered in such a way that the leaf certificate is at first place,
    /// then goes its parent, and so on.
    ///
    /// # Warning
    ///
    /// The chain is at this point **NOT VALIDATED** against any trusted root certificate. In order
    /// to validate the chain against a trusted root certificate, use the
    /// [`X5Chain::verify_against_trusted_roots`] method.
    pub fn new(chain: Vec<X509>) -> Result<Self> {
        // validate the order of certificates
        validate_chain_order(&chain)?;

        let mut chain = chain.into_iter();
        // `expect` is fine as the length is checked within the `validate_chain_order`
        let leaf = chain.next().expect("chain is empty");
        let intermediates = chain.collect();

        Ok(Self {
            leaf,
            intermediates,
        })
    }

    /// Constructs a [`X5Chain`] from raw bytes.
    ///
    /// Each certificate **MUST BE** represented as a [`Vec`] of bytes of the respective certificate
    /// in the _DER_ format.
    ///
    /// The chain **MUST BE** ordered in such a way that the leaf certificate is at first place,
    /// then goes its parent, and so on.
    ///
    /// # Warning
    ///
    /// The chain is at this point **NOT VALIDATED** against any trusted root certificate. In order
    /// to validate the chain against a trusted root certificate, use the
    /// [`X5Chain::verify_against_trusted_roots`] method.
    pub fn from_raw_bytes(bytes: &[Vec<u8>]) -> Result<Self> {
        let certs = bytes
            .iter()
            .enumerate()
            .map(|(i, der)| X509::from_der(der).foreign_err(|| Error::X5Chain).ctx(|| i))
            .collect::<Result<_>>()
            .ctx(|| "invalid X509 certificate")?;

        Self::new(certs)
    }

    /// Constructs a [`X5Chain`] from a concatenation of _PEM_ encoded certificates, leaf first.
    pub fn from_pem_chain(pem: &[u8]) -> Result<Self> {
        let certs = X509::stack_from_pem(pem)
            .foreign_err(|| Error::X5Chain)
            .ctx(|| "invalid PEM certificate stack")?;

        Self::new(certs)
    }

    /// Verify the [`X5Chain`] against trusted root certificates.
    ///
    /// The root certificate may be in chain, but it **MUST BE** found in `trust` as well.
    pub fn verify_against_trusted_roots(&self, trust: &X509Trust) -> Result<()> {
        // Keeping intermediates as a `Vec` instead of a `Stack` keeps Debug, Clone & PartialEq
        // usable, at the price of a clone here.
        let intermediates = chain_to_stack(self.intermediates.clone())?;
        let trust = certs_to_store(trust.0.clone())?;

        // The `X509StoreContext` treats the chain as a list of untrusted helper certificates for
        // building a path from the target certificate to the trust store. For more details check
        // https://docs.openssl.org/master/man3/X509_STORE_CTX_new/

        let mut context = X509StoreContext::new().foreign_err(|| Error::X5Chain)?;
        let is_valid = context
            .init(&trust, &self.leaf, &intermediates, |ctx| {
                clean_up_after_openssl(|| ctx.verify_cert())
            })
            .foreign_err(|| Error::X5Chain)?;

        if !is_valid {
            return Err(bherror::Error::root(Error::X5Chain)
                .ctx("Chain validation against trusted root certificates failed")
                .ctx(format!(
                    "OpenSSL error on depth {}: {}",
                    context.error_depth(),
                    context.error()
                )));
        };

        Ok(())
    }

    /// Convert the chain into a list of DER encoded certificates.
    pub fn as_bytes(&self) -> Result<Vec<Vec<u8>>> {
        let mut bytes = Vec::new();

        bytes.push(self.leaf.to_der().foreign_err(|| Error::X5Chain)?);

        for intermediate in &self.intermediates {
            bytes.push(intermediate.to_der().foreign_err(|| Error::X5Chain)?);
        }

        Ok(bytes)
    }

    /// Returns the public key from the leaf certificate.
    pub fn leaf_certificate_key(&self) -> Result<PKey<Public>> {
        self.leaf_certificate()
            .public_key()
            .foreign_err(|| Error::X5Chain)
            .ctx(|| "Failed to access X509 public key")
    }

    /// Returns the leaf certificate.
    pub fn leaf_certificate(&self) -> &X509 {
        &self.leaf
    }

    /// Returns the validity window of the leaf certificate as `(notBefore, notAfter)` unix
    /// timestamps in seconds.
    pub fn leaf_validity_window(&self) -> Result<(i64, i64)> {
        let not_before = asn1_time_to_unix(self.leaf.not_before())?;
        let not_after = asn1_time_to_unix(self.leaf.not_after())?;

        Ok((not_before, not_after))
    }

    /// Returns the `countryName` attribute of the leaf certificate subject, if present.
    pub fn leaf_subject_country(&self) -> Option<String> {
        self.leaf_subject_entry(Nid::COUNTRYNAME)
    }

    /// Returns the `stateOrProvinceName` attribute of the leaf certificate subject, if present.
    pub fn leaf_subject_state_or_province(&self) -> Option<String> {
        self.leaf_subject_entry(Nid::STATEORPROVINCENAME)
    }

    /// Returns the first subject name entry with the given [`Nid`], if any.
    fn leaf_subject_entry(&self, nid: Nid) -> Option<String> {
        self.leaf
            .subject_name()
            .entries_by_nid(nid)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|value| value.to_string())
    }
}

/// Convert an ASN.1 time into unix seconds.
fn asn1_time_to_unix(time: &Asn1TimeRef) -> Result<i64> {
    let epoch = Asn1Time::from_unix(0).foreign_err(|| Error::X5Chain)?;

    let diff = epoch
        .diff(time)
        .foreign_err(|| Error::X5Chain)
        .ctx(|| "unrepresentable certificate time")?;

    Ok(i64::from(diff.days) * 86_400 + i64::from(diff.secs))
}

/// A collection of [`X509`] trusted root certificates.
///
/// This is used to verify the authenticity of the [`X5Chain`].
#[derive(Debug, Clone)]
pub struct X509Trust(Vec<X509>);

impl X509Trust {
    /// Create a new [`X509Trust`].
    pub fn new(trust: Vec<X509>) -> Self {
        Self(trust)
    }

    /// Create a new [`X509Trust`] from a concatenation of _PEM_ encoded root certificates.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let certs = X509::stack_from_pem(pem)
            .foreign_err(|| Error::X5Chain)
            .ctx(|| "invalid PEM certificate stack")?;

        Ok(Self::new(certs))
    }
}

/// Helper method for converting certificates to `Stack<x509>`.
fn chain_to_stack(chain: impl IntoIterator<Item = X509>) -> Result<Stack<X509>> {
    let mut intermediates = Stack::new().foreign_err(|| Error::X5Chain)?;

    for cert in chain {
        intermediates.push(cert).foreign_err(|| Error::X5Chain)?;
    }

    Ok(intermediates)
}

/// Helper method for converting certificates to `X509Store`.
fn certs_to_store(certificates: impl IntoIterator<Item = X509>) -> Result<X509Store> {
    let mut builder = X509StoreBuilder::new().foreign_err(|| Error::X5Chain)?;
    builder
        .set_flags(X509VerifyFlags::X509_STRICT | X509VerifyFlags::CHECK_SS_SIGNATURE)
        .foreign_err(|| Error::X5Chain)?;

    for cert in certificates {
        builder.add_cert(cert).foreign_err(|| Error::X5Chain)?;
    }

    Ok(builder.build())
}

/// Validates that the certificates in a chain are in order.
///
/// The chain must be ordered in such a way that the leaf certificate is at the
/// first place, then goes its parent, and so on.
///
/// # Note
///
/// This check is not provided through [`X509StoreContext`]. Without this check,
/// chains in reversed order would seem valid, even though they are not.
fn validate_chain_order(chain: &[X509]) -> Result<()> {
    if chain.is_empty() {
        return Err(bherror::Error::root(Error::X5Chain).ctx("chain is empty"));
    }

    let is_ordered = chain
        .windows(2)
        .try_fold(true, |acc, cert_pair| {
            // this is safe since we use the 2-sized sliding window
            let child = &cert_pair[0];
            let parent = &cert_pair[1];

            let is_child = clean_up_after_openssl(|| child.verify(parent.public_key()?.as_ref()))?;

            Ok::<_, openssl::error::ErrorStack>(acc && is_child)
        })
        .foreign_err(|| Error::X5Chain)?;

    if !is_ordered {
        return Err(bherror::Error::root(Error::X5Chain).ctx("invalid chain order"));
    }

    Ok(())
}

/// Wrap a closure calling OpenSSL with low-level cleanup to make it safer in an async context.
///
/// Usage: wrap an `openssl` call in a closure and call this function with it.
/// Try to make the closure as small as possible.
fn clean_up_after_openssl<T>(
    f: impl FnOnce() -> std::result::Result<T, ErrorStack>,
) -> std::result::Result<T, ErrorStack> {
    // Early return on error. Hopefully the error stack will be popped here if everything is correct.
    let return_value = f()?;

    // We did not return early, so we should expect that the call "succeeded".
    // In that case, we expect the error stack to be clean, so clear it if it isn't already.
    drop(ErrorStack::get());

    Ok(return_value)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use openssl::{
        asn1::Asn1Time,
        bn::{BigNum, MsbOption},
        ec::{EcGroup, EcKey},
        hash::MessageDigest,
        nid::Nid,
        pkey::{PKey, Private},
        x509::{X509Builder, X509NameBuilder},
    };

    use super::*;

    fn generate_key() -> PKey<Private> {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        PKey::from_ec_key(key).unwrap()
    }

    fn self_signed(key: &PKey<Private>, country: &str, state: Option<&str>) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COUNTRYNAME, country).unwrap();
        if let Some(state) = state {
            name.append_entry_by_nid(Nid::STATEORPROVINCENAME, state)
                .unwrap();
        }
        name.append_entry_by_nid(Nid::COMMONNAME, "test ds").unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(128, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder
            .set_not_before(&Asn1Time::from_unix(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::from_unix(4_102_444_800).unwrap())
            .unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    #[test]
    fn empty_chain_fails() {
        let err = X5Chain::new(vec![]).unwrap_err();
        assert_matches!(err.error, Error::X5Chain);
    }

    #[test]
    fn self_signed_chain_verifies_against_itself() {
        let key = generate_key();
        let cert = self_signed(&key, "US", None);

        let chain = X5Chain::new(vec![cert.clone()]).unwrap();
        let trust = X509Trust::new(vec![cert]);

        chain.verify_against_trusted_roots(&trust).unwrap();
    }

    #[test]
    fn untrusted_chain_fails() {
        let cert = self_signed(&generate_key(), "US", None);
        let other = self_signed(&generate_key(), "US", None);

        let chain = X5Chain::new(vec![cert]).unwrap();
        let trust = X509Trust::new(vec![other]);

        let err = chain.verify_against_trusted_roots(&trust).unwrap_err();
        assert_matches!(err.error, Error::X5Chain);
    }

    #[test]
    fn der_round_trip() {
        let cert = self_signed(&generate_key(), "US", None);
        let chain = X5Chain::new(vec![cert]).unwrap();

        let bytes = chain.as_bytes().unwrap();
        let decoded = X5Chain::from_raw_bytes(&bytes).unwrap();

        assert_eq!(chain, decoded);
    }

    #[test]
    fn leaf_subject_attributes() {
        let cert = self_signed(&generate_key(), "HR", Some("Grad Zagreb"));
        let chain = X5Chain::new(vec![cert]).unwrap();

        assert_eq!(chain.leaf_subject_country().as_deref(), Some("HR"));
        assert_eq!(
            chain.leaf_subject_state_or_province().as_deref(),
            Some("Grad Zagreb")
        );
    }

    #[test]
    fn leaf_validity_window() {
        let cert = self_signed(&generate_key(), "US", None);
        let chain = X5Chain::new(vec![cert]).unwrap();

        let (not_before, not_after) = chain.leaf_validity_window().unwrap();

        assert_eq!(not_before, 0);
        assert_eq!(not_after, 4_102_444_800);
    }
}
