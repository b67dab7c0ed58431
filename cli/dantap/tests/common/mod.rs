//! In-memory link layer and allocation backend for workflow tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use dan_descriptor::{AllocationResult, IpNet};
use dan_tap::{Ipam, IpamError, Link, LinkError, LinkLayer};

pub const CONF: &str = r#"{
    "cniVersion": "1.0.0",
    "name": "dan",
    "type": "dantap",
    "bridge": "br0",
    "bridgeIP": "10.0.0.1/24",
    "ipam": {"type": "static", "addresses": [{"address": "10.0.0.5/24"}]}
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bridge,
    Tap,
}

#[derive(Debug, Clone)]
pub struct FakeLink {
    pub kind: Kind,
    pub index: u32,
    pub mac: String,
    pub master: Option<String>,
    pub up: bool,
    pub addresses: Vec<IpNet>,
}

/// Link layer keeping links in memory.
#[derive(Default)]
pub struct FakeLinkLayer {
    links: Mutex<BTreeMap<String, FakeLink>>,
    failures: Mutex<Vec<(String, String)>>,
    hidden: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    next_index: Mutex<u32>,
}

impl FakeLinkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a bridge with an address.
    pub fn with_bridge(self, name: &str, cidr: &str) -> Self {
        self.insert(name, Kind::Bridge);
        self.links.lock().unwrap().get_mut(name).unwrap().addresses =
            vec![IpNet::from_cidr(cidr).unwrap()];
        self
    }

    /// Make `op` fail for `target` with a command error.
    pub fn fail(self, op: &str, target: &str) -> Self {
        self.failures
            .lock()
            .unwrap()
            .push((op.to_string(), target.to_string()));
        self
    }

    /// Make the first lookup of `name` miss, as if a peer created it right after.
    pub fn hidden_once(self, name: &str) -> Self {
        self.hidden.lock().unwrap().push(name.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<FakeLink> {
        self.links.lock().unwrap().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn taps(&self) -> Vec<String> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, link)| link.kind == Kind::Tap)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, op: &str, target: &str) -> Result<(), LinkError> {
        self.calls.lock().unwrap().push(format!("{} {}", op, target));
        let failing = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|(o, t)| o == op && t == target);
        if failing {
            return Err(LinkError::Command {
                args: format!("{} {}", op, target),
                stderr: "RTNETLINK answers: Operation not permitted".to_string(),
            });
        }
        Ok(())
    }

    fn insert(&self, name: &str, kind: Kind) {
        let mut next = self.next_index.lock().unwrap();
        *next += 1;
        let index = *next;
        self.links.lock().unwrap().insert(
            name.to_string(),
            FakeLink {
                kind,
                index,
                mac: format!("0a:58:0a:00:00:{:02x}", index),
                master: None,
                up: false,
                addresses: Vec::new(),
            },
        );
    }

    fn with_link<T>(&self, name: &str, f: impl FnOnce(&mut FakeLink) -> T) -> Result<T, LinkError> {
        let mut links = self.links.lock().unwrap();
        let link = links
            .get_mut(name)
            .ok_or_else(|| LinkError::NotFound(name.to_string()))?;
        Ok(f(link))
    }
}

impl LinkLayer for FakeLinkLayer {
    fn link_by_name(&self, name: &str) -> Result<Link, LinkError> {
        self.record("show", name)?;
        {
            let mut hidden = self.hidden.lock().unwrap();
            if let Some(pos) = hidden.iter().position(|h| h == name) {
                hidden.remove(pos);
                return Err(LinkError::NotFound(name.to_string()));
            }
        }
        self.with_link(name, |link| Link {
            index: link.index,
            name: name.to_string(),
            mac: link.mac.clone(),
            addresses: link.addresses.clone(),
        })
    }

    fn add_bridge(&self, name: &str) -> Result<(), LinkError> {
        self.record("add_bridge", name)?;
        if self.exists(name) {
            return Err(LinkError::AlreadyExists(name.to_string()));
        }
        self.insert(name, Kind::Bridge);
        Ok(())
    }

    fn add_address(&self, name: &str, addr: &IpNet) -> Result<(), LinkError> {
        self.record("add_address", name)?;
        self.with_link(name, |link| {
            if link.addresses.contains(addr) {
                return Err(LinkError::AlreadyExists(format!("{} on {}", addr, name)));
            }
            link.addresses.push(*addr);
            Ok(())
        })?
    }

    fn add_tap(&self, name: &str) -> Result<(), LinkError> {
        self.record("add_tap", name)?;
        if self.exists(name) {
            return Err(LinkError::AlreadyExists(name.to_string()));
        }
        self.insert(name, Kind::Tap);
        Ok(())
    }

    fn set_master(&self, name: &str, master: &str) -> Result<(), LinkError> {
        self.record("set_master", name)?;
        if !self.exists(master) {
            return Err(LinkError::NotFound(master.to_string()));
        }
        self.with_link(name, |link| link.master = Some(master.to_string()))
    }

    fn set_up(&self, name: &str) -> Result<(), LinkError> {
        self.record("set_up", name)?;
        self.with_link(name, |link| link.up = true)
    }

    fn delete_link(&self, name: &str) -> Result<(), LinkError> {
        self.record("delete", name)?;
        self.links
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| LinkError::NotFound(name.to_string()))
    }
}

/// Allocation backend handing out a fixed result.
pub struct FakeIpam {
    result: AllocationResult,
    fail_add: bool,
    fail_del: bool,
    leases: Mutex<usize>,
    calls: Mutex<Vec<String>>,
}

impl FakeIpam {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result: serde_json::from_value(result).unwrap(),
            fail_add: false,
            fail_del: false,
            leases: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Backend handing out 10.0.0.5/24 with a default route.
    pub fn static_v4() -> Self {
        Self::new(serde_json::json!({
            "cniVersion": "1.0.0",
            "ips": [{"address": "10.0.0.5/24", "gateway": "10.0.0.1"}],
            "routes": [{"dst": "0.0.0.0/0", "gw": "10.0.0.1"}]
        }))
    }

    pub fn failing_add(mut self) -> Self {
        self.fail_add = true;
        self
    }

    pub fn failing_del(mut self) -> Self {
        self.fail_del = true;
        self
    }

    pub fn leases(&self) -> usize {
        *self.leases.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Ipam for FakeIpam {
    fn add(&self, plugin: &str, _payload: &[u8]) -> Result<AllocationResult, IpamError> {
        self.calls.lock().unwrap().push(format!("add {}", plugin));
        if self.fail_add {
            return Err(IpamError::Plugin {
                plugin: plugin.to_string(),
                code: 11,
                msg: "no addresses available".to_string(),
                details: None,
            });
        }
        *self.leases.lock().unwrap() += 1;
        Ok(self.result.clone())
    }

    fn del(&self, plugin: &str, _payload: &[u8]) -> Result<(), IpamError> {
        self.calls.lock().unwrap().push(format!("del {}", plugin));
        if self.fail_del {
            return Err(IpamError::Exit {
                plugin: plugin.to_string(),
                status: "exit status: 1".to_string(),
                stderr: "lease store locked".to_string(),
            });
        }
        let mut leases = self.leases.lock().unwrap();
        *leases = leases.saturating_sub(1);
        Ok(())
    }
}
