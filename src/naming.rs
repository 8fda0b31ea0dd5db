//! Instance display names derived from the cluster and public address.
//!
//! Names have the form `<cluster>-AAA-BBB-CCC-DDD` where each group is an
//! octet of the public IPv4 address zero-padded to three digits, so the same
//! inputs always produce the same name and operators can grep inventory by
//! address.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Errors raised while deriving a display name.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NamingError {
    /// Raised when the public address is not a dotted IPv4 address.
    #[error("public address '{0}' is not an IPv4 address")]
    NotIpv4(String),
}

/// Derives the display name for an instance in `cluster` reachable at
/// `public_ip`.
///
/// # Errors
///
/// Returns [`NamingError::NotIpv4`] when `public_ip` does not parse as IPv4.
///
/// # Examples
///
/// ```
/// # use pelican::naming::derive_display_name;
/// let name = derive_display_name("c1", "203.0.113.7").expect("valid address");
/// assert_eq!(name, "c1-203-000-113-007");
/// ```
pub fn derive_display_name(cluster: &str, public_ip: &str) -> Result<String, NamingError> {
    let address: Ipv4Addr = public_ip
        .trim()
        .parse()
        .map_err(|_| NamingError::NotIpv4(public_ip.to_owned()))?;
    let [a, b, c, d] = address.octets();
    Ok(format!("{cluster}-{a:03}-{b:03}-{c:03}-{d:03}"))
}
