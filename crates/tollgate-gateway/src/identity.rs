//! Caller identity resolution.
//!
//! Every request is tracked under a key built from its policy category, its
//! normalised origin address and the optional client-supplied device
//! fingerprint. Resolution never fails: a missing address lands in the
//! shared `"unknown"` bucket and a missing fingerprint in `"none"`.

use tollgate_kernel::admission::GatewayRequest;

/// Address used when the origin cannot be determined.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Fingerprint segment used when the client sent none.
pub const NO_FINGERPRINT: &str = "none";

/// Header carrying the opaque device fingerprint.
pub const FINGERPRINT_HEADER: &str = "x-device-fingerprint";

const MAPPED_V4_PREFIX: &str = "::ffff:";

/// The resolved identity of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Normalised origin address (keys the behaviour record).
    pub address: String,
    /// Device fingerprint, if the client supplied a non-blank one.
    pub fingerprint: Option<String>,
    /// `category:address:fingerprint` (keys the quota record).
    pub key: String,
}

/// Strip an IPv6-mapped-IPv4 prefix and substitute [`UNKNOWN_ADDRESS`] for
/// a missing or blank address.
pub fn normalize_address(raw: Option<&str>) -> String {
    let Some(addr) = raw.map(str::trim).filter(|a| !a.is_empty()) else {
        return UNKNOWN_ADDRESS.to_string();
    };
    match addr.get(..MAPPED_V4_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(MAPPED_V4_PREFIX) => {
            addr[MAPPED_V4_PREFIX.len()..].to_string()
        }
        _ => addr.to_string(),
    }
}

/// Build the quota key for a (category, address, fingerprint) triple.
pub fn tracking_key(category: &str, address: &str, fingerprint: Option<&str>) -> String {
    format!(
        "{category}:{address}:{}",
        fingerprint.unwrap_or(NO_FINGERPRINT)
    )
}

/// Derives [`Identity`] values from inbound requests.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    trust_forwarded_for: bool,
}

impl IdentityResolver {
    /// `trust_forwarded_for` makes the first `x-forwarded-for` hop (then
    /// `x-real-ip`) take precedence over the transport peer address. Only
    /// enable it behind a proxy that overwrites those headers.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    /// Resolve the identity of `req` under `category`.
    pub fn resolve(&self, req: &GatewayRequest, category: &str) -> Identity {
        let address = normalize_address(self.origin(req));
        let fingerprint = req
            .header(FINGERPRINT_HEADER)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let key = tracking_key(category, &address, fingerprint.as_deref());
        Identity {
            address,
            fingerprint,
            key,
        }
    }

    fn origin<'a>(&self, req: &'a GatewayRequest) -> Option<&'a str> {
        if self.trust_forwarded_for {
            let forwarded = req
                .header("x-forwarded-for")
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| req.header("x-real-ip").map(str::trim).filter(|v| !v.is_empty()));
            if forwarded.is_some() {
                return forwarded;
            }
        }
        req.remote_addr.as_deref()
    }
}
