use std::net::Ipv4Addr;

/// IP utility functions for validation

/// Check if a string is a valid IPv4 address
pub fn is_valid_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("10.0.0.1"));
        assert!(is_valid_ipv4("7.0.0.2"));
        assert!(!is_valid_ipv4("10.0.0"));
        assert!(!is_valid_ipv4("::1"));
        assert!(!is_valid_ipv4("node1"));
    }
}
