//! Typed read models of the rows served by the list endpoints
//!
//! The core treats rows as opaque JSON; these types exist for callers that
//! want to work with a specific screen's records. Every field is defaulted so
//! a partial or newer payload still deserializes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account summary embedded in `changed_by`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangedBy {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Leased and static addresses of a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAddresses {
    pub leased: Vec<String>,
    #[serde(rename = "static")]
    pub fixed: Vec<String>,
}

/// DHCP group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpGroup {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// Host, keyed by MAC address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub mac: String,
    pub hostname: String,
    pub expires: Option<DateTime<Utc>>,
    pub description: String,
    pub changed: Option<DateTime<Utc>>,
    pub changed_by: Option<ChangedBy>,
    pub user_owners: Vec<String>,
    pub group_owners: Vec<String>,
    pub addresses: HostAddresses,
    pub attributes: BTreeMap<String, String>,
    pub is_dynamic: bool,
    pub disabled_host: bool,
    pub master_ip_address: Option<String>,
    pub dhcp_group: Option<DhcpGroup>,
}

impl Host {
    /// Whether the host has expired at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    /// Whole days until expiry, rounded up; `None` without an expiry date
    /// or once expired
    pub fn days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        let expires = self.expires?;
        if expires < now {
            return None;
        }
        let seconds = (expires - now).num_seconds();
        Some((seconds + 86_399) / 86_400)
    }
}

/// DNS record, keyed by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsRecord {
    pub id: i64,
    pub name: String,
    pub dns_type: String,
    pub ttl: i64,
    pub content: Option<String>,
    pub ip_content: Option<String>,
    pub text_content: Option<String>,
    pub host: Option<String>,
    pub url: Option<String>,
}

impl DnsRecord {
    /// Whichever content field the backend filled
    pub fn display_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .or(self.ip_content.as_deref())
            .or(self.text_content.as_deref())
    }
}

/// DNS record created by DHCP
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhcpDnsRecord {
    pub id: i64,
    pub host: String,
    pub ip_content: String,
    pub domain: Option<String>,
    pub ttl: i64,
    pub changed: Option<String>,
}

/// Network address, keyed by the address itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub address: String,
    pub host: Option<String>,
    pub hostname: Option<String>,
    pub gateway: Option<String>,
    pub network: Option<String>,
    pub reserved: bool,
    pub pool: Option<String>,
    pub address_type: Option<String>,
    pub changed: Option<String>,
    pub last_seen: Option<String>,
}

/// DNS domain, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Domain {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub master: Option<String>,
    pub changed: Option<String>,
    pub changed_by: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub notified_serial: Option<String>,
    pub account: Option<String>,
    pub last_check: Option<String>,
    pub user_perms: BTreeMap<String, String>,
    pub group_perms: BTreeMap<String, String>,
}

/// User account, keyed by username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_staff: bool,
    pub is_ipamadmin: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub source: Option<String>,
    pub last_login: Option<String>,
    pub date_joined: Option<String>,
}

impl User {
    /// "First Last", as shown in the Full Name column
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Join date, when the backend sent a parseable one
    pub fn joined_on(&self) -> Option<NaiveDate> {
        let raw = self.date_joined.as_deref()?;
        let day = raw.get(..10)?;
        NaiveDate::parse_from_str(day, crate::descriptor::DATE_FORMAT).ok()
    }
}
