//! Small networking helpers shared by registration and address validation.

use std::net::TcpListener;

/// Best-effort intranet IPv4 address of the current host.
///
/// Used to rewrite `localhost`/`0.0.0.0`/`127.0.0.1` registration
/// addresses into something peers on other hosts can actually dial.
/// Returns `None` if no non-loopback interface address can be found.
pub fn intranet_ip() -> Option<String> {
    local_ip_address::local_ip()
        .ok()
        .map(|ip| ip.to_string())
}

/// Binds an ephemeral TCP listener and reports the `host:port` it bound
/// to, with `port` replaced by the OS-assigned value.
///
/// Mirrors the original's `getListener`: callers that want to stand up a
/// server without hard-coding a port can bind first, register the
/// resolved address, then hand the listener to their server.
pub fn pick_local_addr(host: &str) -> std::io::Result<(TcpListener, String)> {
    let listener = TcpListener::bind((host, 0))?;
    let port = listener.local_addr()?.port();
    Ok((listener, format!("{}:{}", host, port)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_local_addr_resolves_port() {
        let (_listener, addr) = pick_local_addr("127.0.0.1").unwrap();
        assert!(addr.starts_with("127.0.0.1:"));
        let port: u16 = addr.rsplit(':').next().unwrap().parse().unwrap();
        assert!(port > 0);
    }
}
