//! Built-in table schemas of the console screens
//!
//! | Screen         | Endpoint     | Key        | Paging             |
//! |----------------|--------------|------------|--------------------|
//! | `hosts`        | `hosts/`     | `mac`      | prefetch, 10/page  |
//! | `my_hosts`     | `hosts/`     | `mac`      | single, 10/page    |
//! | `dns_records`  | `dns/`       | `id`       | single, 10/page    |
//! | `domain_dns`   | `dns/`       | `id`       | single, 10/page    |
//! | `dhcp_records` | `dhcp-dns/`  | `id`       | single, 10/page    |
//! | `addresses`    | `addresses/` | `address`  | prefetch, 10/page  |
//! | `domains`      | `domains/`   | `name`     | prefetch, 10/page  |
//! | `users`        | `users/`     | `username` | single, 25/page    |
//!
//! Scoped screens (`my_hosts`, `domain_dns`, `addresses`) expect the owner
//! to set their scope (user, domain, network) after opening.

use crate::coordinator::FetchMode;
use crate::descriptor::{ColumnDescriptor as Col, FilterDescriptor as Filter, TableSchema};

/// Names accepted by [`by_name`]
pub const SCREEN_NAMES: [&str; 8] = [
    "hosts",
    "my_hosts",
    "dns_records",
    "domain_dns",
    "dhcp_records",
    "addresses",
    "domains",
    "users",
];

/// Page sizes offered on every screen
pub const PAGE_SIZE_OPTIONS: [u32; 5] = [10, 25, 50, 100, 250];

/// DNS record types offered before the `dns-types/` lookup is loaded
pub const DNS_TYPES: [&str; 65] = [
    "A", "A6", "AAAA", "AFSDB", "APL", "ATMA", "AXFR", "CERT", "CNAME", "DHCID", "DLV", "DNAME",
    "DNSKEY", "DS", "EID", "GID", "GPOS", "HINFO", "HIP", "IPSECKEY", "ISDN", "IXFR", "KEY", "KX",
    "LOC", "MAILA", "MAILB", "MB", "MD", "MF", "MG", "MINFO", "MR", "MX", "NAPTR", "NIMLOC", "NS",
    "NSAP", "NSAP-PTR", "NSEC", "NSEC3", "NSEC3PARAM", "NULL", "NXT", "OPT", "PTR", "PX", "RP",
    "RRSIG", "RT", "SIG", "SINK", "SOA", "SPF", "SRV", "SSHFP", "TA", "TKEY", "TSIG", "TXT", "UID",
    "UINFO", "UNSPEC", "WKS", "X25",
];

/// User account sources
pub const USER_SOURCES: [&str; 2] = ["LDAP", "INTERNAL"];

const ADDRESS_TYPES_ENDPOINT: &str = "address-types/";

/// Schema for a screen name
pub fn by_name(name: &str) -> Option<TableSchema> {
    let schema = match name {
        "hosts" => hosts(),
        "my_hosts" => my_hosts(),
        "dns_records" => dns_records(),
        "domain_dns" => domain_dns(),
        "dhcp_records" => dhcp_records(),
        "addresses" => addresses(),
        "domains" => domains(),
        "users" => users(),
        _ => return None,
    };
    Some(schema)
}

fn schema(
    screen: &str,
    endpoint: &str,
    key_field: &str,
    columns: Vec<Col>,
    default_page_size: u32,
    fetch_mode: FetchMode,
) -> TableSchema {
    TableSchema {
        screen: screen.to_string(),
        endpoint: endpoint.to_string(),
        key_field: key_field.to_string(),
        columns,
        page_size_options: PAGE_SIZE_OPTIONS.to_vec(),
        default_page_size,
        fetch_mode,
        persist_query: false,
        lookup_endpoint: None,
    }
}

fn host_columns() -> Vec<Col> {
    vec![
        Col::new("mac", "Mac").sortable().pinned().filter(Filter::text("mac")),
        Col::new("hostname", "Hostname")
            .sortable()
            .pinned()
            .filter(Filter::text("hostname")),
        Col::new("expires", "Expires")
            .sortable()
            .filter(Filter::expiration("expires")),
        Col::new("ip_addresses", "IP Addresses").filter(Filter::text("ip_address")),
        Col::new("dhcp_group", "DHCP Group").filter(Filter::text("dhcp_group")),
        Col::new("disabled_host", "Disabled Host").filter(Filter::boolean("disabled")),
        Col::new("is_dynamic", "Dynamic").filter(Filter::boolean("is_dynamic")),
        Col::new("user_owners", "User Owners").filter(Filter::text("user")),
        Col::new("group_owners", "Group Owners").filter(Filter::text("group")),
        Col::new("address_type", "Address Type")
            .hidden()
            .filter(Filter::address_type("address_type")),
        Col::new("description", "Description")
            .hidden()
            .filter(Filter::text("description")),
        Col::new("changed", "Changed")
            .sortable()
            .hidden()
            .filter(Filter::date_range("changed")),
        Col::new("changed_by", "Changed By")
            .hidden()
            .filter(Filter::text("changed_by")),
    ]
}

/// All hosts the operator can see
///
/// The only screen that round-trips its full query through the store.
pub fn hosts() -> TableSchema {
    let mut schema = schema(
        "hosts",
        "hosts/",
        "mac",
        host_columns(),
        10,
        FetchMode::prefetch(),
    );
    schema.persist_query = true;
    schema.lookup_endpoint = Some(ADDRESS_TYPES_ENDPOINT.to_string());
    schema
}

/// Hosts owned by the operator (scope `mine=<username>`)
pub fn my_hosts() -> TableSchema {
    let columns = host_columns()
        .into_iter()
        .filter(|c| c.id != "user_owners" && c.id != "disabled_host")
        .collect();
    let mut schema = schema("my_hosts", "hosts/", "mac", columns, 10, FetchMode::SinglePage);
    schema.lookup_endpoint = Some(ADDRESS_TYPES_ENDPOINT.to_string());
    schema
}

fn dns_columns() -> Vec<Col> {
    vec![
        Col::new("name", "Name").sortable().pinned().filter(Filter::text("name")),
        Col::new("content", "Content").filter(Filter::text("content")),
        Col::new("dns_type", "Type")
            .sortable()
            .filter(Filter::exact("dns_type", DNS_TYPES).with_options_endpoint("dns-types/")),
        Col::new("ttl", "TTL").sortable().filter(Filter::text("ttl")),
        Col::new("host", "Host").filter(Filter::text("host")),
    ]
}

/// DNS records across all domains
pub fn dns_records() -> TableSchema {
    schema("dns_records", "dns/", "id", dns_columns(), 10, FetchMode::SinglePage)
}

/// DNS records of one domain (scope `domain=<name>`)
pub fn domain_dns() -> TableSchema {
    schema("domain_dns", "dns/", "id", dns_columns(), 10, FetchMode::SinglePage)
}

/// DNS records created by DHCP
pub fn dhcp_records() -> TableSchema {
    let columns = vec![
        Col::new("host", "Host").sortable().pinned().filter(Filter::text("host")),
        Col::new("ip_content", "IP Content").filter(Filter::text("ip_content")),
        Col::new("domain", "Domain").filter(Filter::text("domain")),
        Col::new("ttl", "TTL").filter(Filter::text("ttl")),
        Col::new("changed", "Changed")
            .sortable()
            .filter(Filter::date_range("changed")),
    ];
    schema("dhcp_records", "dhcp-dns/", "id", columns, 10, FetchMode::SinglePage)
}

/// Addresses of one network (scope `network=<cidr>`)
pub fn addresses() -> TableSchema {
    let columns = vec![
        Col::new("address", "Address")
            .sortable()
            .pinned()
            .filter(Filter::text("address")),
        Col::new("host", "Host").filter(Filter::text("host")),
        Col::new("hostname", "Hostname").filter(Filter::text("hostname")),
        Col::new("gateway", "Gateway").filter(Filter::text("gateway")),
        Col::new("reserved", "Reserved").filter(Filter::boolean("reserved")),
        Col::new("pool", "Pool").filter(Filter::text("pool")),
        Col::new("address_type", "Address Type").filter(Filter::address_type("address_type")),
        Col::new("changed", "Changed")
            .sortable()
            .hidden()
            .filter(Filter::date_range("changed")),
        Col::new("last_seen", "Last Seen")
            .hidden()
            .filter(Filter::date_range("last_seen")),
    ];
    let mut schema = schema(
        "addresses",
        "addresses/",
        "address",
        columns,
        10,
        FetchMode::prefetch(),
    );
    schema.lookup_endpoint = Some(ADDRESS_TYPES_ENDPOINT.to_string());
    schema
}

/// DNS domains
pub fn domains() -> TableSchema {
    let columns = vec![
        Col::new("name", "Name").sortable().pinned().filter(Filter::text("name")),
        Col::new("description", "Description").filter(Filter::text("description")),
        Col::new("master", "Master").filter(Filter::text("master")),
        Col::new("changed", "Changed")
            .sortable()
            .filter(Filter::date_range("changed")),
        Col::new("changed_by", "Changed By").filter(Filter::text("changed_by")),
        Col::new("last_check", "Last Check").hidden(),
    ];
    schema("domains", "domains/", "name", columns, 10, FetchMode::prefetch())
}

/// User accounts
pub fn users() -> TableSchema {
    let columns = vec![
        Col::new("username", "Username")
            .sortable()
            .pinned()
            .filter(Filter::text("username")),
        Col::new("fullname", "Full Name"),
        Col::new("first_name", "First Name")
            .sortable()
            .hidden()
            .filter(Filter::text("first_name")),
        Col::new("last_name", "Last Name")
            .sortable()
            .hidden()
            .filter(Filter::text("last_name")),
        Col::new("email", "Email").sortable().filter(Filter::text("email")),
        Col::new("is_staff", "Staff").filter(Filter::boolean("is_staff")),
        Col::new("is_ipamadmin", "Admin").filter(Filter::boolean("is_ipamadmin")),
        Col::new("is_superuser", "Superuser").filter(Filter::boolean("is_superuser")),
        Col::new("is_active", "Active")
            .sortable()
            .hidden()
            .filter(Filter::boolean("is_active")),
        Col::new("source", "Source")
            .sortable()
            .filter(Filter::exact("source", USER_SOURCES)),
        Col::new("last_login", "Last Login")
            .sortable()
            .filter(Filter::date_range("last_login")),
        Col::new("date_joined", "Date Joined")
            .hidden()
            .filter(Filter::date_range("date_joined")),
    ];
    schema("users", "users/", "username", columns, 25, FetchMode::SinglePage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FilterKind;

    #[test]
    fn test_every_name_resolves() {
        for name in SCREEN_NAMES {
            let schema = by_name(name).unwrap();
            assert_eq!(schema.screen, name);
            assert!(schema.allows_page_size(schema.default_page_size));
            assert!(schema.column(&schema.key_field).is_some() || schema.key_field == "id");
        }
        assert!(by_name("nope").is_none());
    }

    #[test]
    fn test_users_defaults() {
        let schema = users();
        let visibility = schema.default_visibility();
        for hidden in ["first_name", "last_name", "date_joined", "is_active"] {
            assert_eq!(visibility.get(hidden), Some(&false), "{} should start hidden", hidden);
        }
        assert_eq!(schema.default_page_size, 25);
        assert_eq!(schema.filter("source").unwrap().options(), &["LDAP", "INTERNAL"]);
    }

    #[test]
    fn test_owner_filters_use_backend_param_names() {
        let schema = hosts();
        assert_eq!(
            schema.filter("group_owners").unwrap().kind,
            FilterKind::Text {
                param: "group".to_string()
            }
        );
        assert_eq!(
            schema.filter("ip_addresses").unwrap().kind,
            FilterKind::Text {
                param: "ip_address".to_string()
            }
        );
        assert!(schema.uses_address_types());
    }
}
