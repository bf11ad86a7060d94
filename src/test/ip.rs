use crate::net::{IpAddr, IpPrefix};

#[test]
fn parses_and_formats_dotted_quad() {
    let ip: IpAddr = "10.1.2.3".parse().expect("valid ip");
    assert_eq!(ip.octets(), [10, 1, 2, 3]);
    assert_eq!(ip.to_string(), "10.1.2.3");
    assert_eq!(ip.0, (10 << 24) | (1 << 16) | (2 << 8) | 3);
}

#[test]
fn rejects_malformed_addresses() {
    assert!("10.1.2".parse::<IpAddr>().is_err());
    assert!("10.1.2.3.4".parse::<IpAddr>().is_err());
    assert!("10.1.2.256".parse::<IpAddr>().is_err());
    assert!("ten.one.two.three".parse::<IpAddr>().is_err());
}

#[test]
fn prefix_contains_masks_network_bits() {
    let p: IpPrefix = "10.1.2.0/24".parse().expect("valid prefix");
    assert!(p.contains("10.1.2.7".parse().expect("ip")));
    assert!(!p.contains("10.1.3.7".parse().expect("ip")));

    let pod: IpPrefix = "10.1.0.0/16".parse().expect("valid prefix");
    assert!(pod.contains("10.1.200.9".parse().expect("ip")));
    assert!(!pod.contains("10.2.0.1".parse().expect("ip")));
}

#[test]
fn prefix_normalizes_host_bits() {
    let p: IpPrefix = "10.1.2.77/24".parse().expect("valid prefix");
    assert_eq!(p.network().to_string(), "10.1.2.0");
    assert_eq!(p.to_string(), "10.1.2.0/24");
}

#[test]
fn zero_length_prefix_matches_everything() {
    let p: IpPrefix = "0.0.0.0/0".parse().expect("valid prefix");
    assert!(p.contains("255.255.255.255".parse().expect("ip")));
    assert!(p.contains("0.0.0.1".parse().expect("ip")));
}

#[test]
fn rejects_malformed_prefixes() {
    assert!("10.1.2.0".parse::<IpPrefix>().is_err());
    assert!("10.1.2.0/33".parse::<IpPrefix>().is_err());
    assert!("10.1.2.0/x".parse::<IpPrefix>().is_err());
}
