//! In-memory backends for tests
//!
//! All handles built by one [`TestEnv`] share its state, so a test can seed
//! the "remote" world, run a program, then inspect what changed.

use crate::registry::ResourceTypeRegistry;
use crate::resource::{BoxedResource, Resource, ResourceSchema};
use crate::types::Properties;
use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct EnvState {
    clock: String,
    files: IndexMap<String, Properties>,
    servers: Vec<Option<Properties>>,
    ip_addresses: IndexMap<String, Value>,
    joined: IndexMap<String, Value>,
    pending_polls: usize,
    failures: Vec<String>,
}

/// Shared fake remote world
#[derive(Debug, Clone, Default)]
pub struct TestEnv {
    state: Arc<Mutex<EnvState>>,
}

fn object(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

fn pick(record: &Properties, fields: &[String]) -> Properties {
    fields
        .iter()
        .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self::default();
        env.set_clock("2000-01-01 00:00:00 UTC");
        env
    }

    fn with<R>(&self, f: impl FnOnce(&mut EnvState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_clock(&self, now: &str) {
        self.with(|s| s.clock = now.to_string());
    }

    /// Make the next `n` completion checks report "not yet"
    pub fn set_pending_polls(&self, n: usize) {
        self.with(|s| s.pending_polls = n);
    }

    /// Make `<type>.<operation>` fail, e.g. `ip_address.update_complete`
    pub fn fail(&self, operation: &str) {
        self.with(|s| s.failures.push(operation.to_string()));
    }

    pub fn add_file(&self, name: &str, contents: &str, created_at: &str) {
        self.with(|s| {
            s.files.insert(
                name.to_string(),
                object(json!({
                    "name": name,
                    "contents": contents,
                    "created_at": created_at,
                    "updated_at": created_at,
                })),
            );
        });
    }

    /// Add a server and return its id
    pub fn add_server(&self, size: &str, created_at: &str) -> String {
        self.with(|s| {
            s.servers
                .push(Some(object(json!({"size": size, "created_at": created_at}))));
            format!("server{}", s.servers.len() - 1)
        })
    }

    pub fn add_ip_address(&self, address: &str, server_id: &str) {
        self.with(|s| {
            s.ip_addresses
                .insert(address.to_string(), Value::from(server_id));
        });
    }

    pub fn files(&self) -> IndexMap<String, Properties> {
        self.with(|s| s.files.clone())
    }

    pub fn servers(&self) -> Vec<Option<Properties>> {
        self.with(|s| s.servers.clone())
    }

    pub fn ip_addresses(&self) -> IndexMap<String, Value> {
        self.with(|s| s.ip_addresses.clone())
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.with(|s| s.failures.iter().any(|f| f == operation)) {
            bail!("{operation}: injected failure");
        }
        Ok(())
    }

    fn poll(&self, operation: &str) -> Result<bool> {
        self.check(operation)?;
        Ok(self.with(|s| {
            if s.pending_polls > 0 {
                s.pending_polls -= 1;
                false
            } else {
                true
            }
        }))
    }

    /// Registry with `file`, `server`, `ip_address` and `string_joiner`
    pub fn registry(&self) -> ResourceTypeRegistry {
        let mut registry = ResourceTypeRegistry::new();

        let env = self.clone();
        registry.register(
            "file",
            ResourceSchema::new()
                .mutable(["contents"])
                .immutable(["name"])
                .outputs(["created_at", "updated_at"])
                .required(["name"]),
            move |id| -> BoxedResource { Box::new(FileResource { env: env.clone(), id }) },
        );

        let env = self.clone();
        registry.register(
            "server",
            ResourceSchema::new()
                .immutable(["size"])
                .outputs(["created_at"])
                .with_remote_id()
                .deleted_at_end(),
            move |id| -> BoxedResource { Box::new(ServerResource { env: env.clone(), id }) },
        );

        let env = self.clone();
        registry.register(
            "ip_address",
            ResourceSchema::new().mutable(["server_id"]).with_remote_id(),
            move |id| -> BoxedResource { Box::new(IpAddressResource { env: env.clone(), id }) },
        );

        let env = self.clone();
        registry.register(
            "string_joiner",
            ResourceSchema::new()
                .mutable(["strings"])
                .outputs(["result"])
                .with_remote_id(),
            move |id| -> BoxedResource { Box::new(StringJoinerResource { env: env.clone(), id }) },
        );

        registry
    }
}

fn id_str(id: Option<&Value>) -> Result<String> {
    id.and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no remote id"))
}

#[derive(Debug)]
struct FileResource {
    env: TestEnv,
    id: Option<Value>,
}

impl Resource for FileResource {
    fn remote_id(&self) -> Option<Value> {
        self.id.clone()
    }

    fn create(&mut self, properties: &Properties) -> Result<()> {
        self.env.check("file.create")?;
        let name = properties
            .get("name")
            .and_then(Value::as_str)
            .context("file needs a name")?
            .to_string();
        self.env.with(|s| {
            let mut record = Properties::new();
            record.insert("name".into(), Value::from(name.as_str()));
            record.insert(
                "contents".into(),
                properties.get("contents").cloned().unwrap_or(Value::Null),
            );
            record.insert("created_at".into(), Value::from(s.clock.as_str()));
            record.insert("updated_at".into(), Value::from(s.clock.as_str()));
            s.files.insert(name.clone(), record);
        });
        self.id = Some(Value::from(name));
        Ok(())
    }

    fn read(&self, fields: &[String]) -> Result<Properties> {
        let name = id_str(self.id.as_ref())?;
        self.env.with(|s| {
            s.files
                .get(&name)
                .map(|record| pick(record, fields))
                .ok_or_else(|| anyhow!("no such file: {name}"))
        })
    }

    fn update(&mut self, properties: &Properties) -> Result<()> {
        self.env.check("file.update")?;
        let name = id_str(self.id.as_ref())?;
        self.env.with(|s| -> Result<()> {
            let clock = s.clock.clone();
            let record = s
                .files
                .get_mut(&name)
                .ok_or_else(|| anyhow!("no such file: {name}"))?;
            for (k, v) in properties {
                record.insert(k.clone(), v.clone());
            }
            record.insert("updated_at".into(), Value::from(clock));
            Ok(())
        })
    }

    fn delete(&mut self) -> Result<()> {
        let name = id_str(self.id.as_ref())?;
        self.env.with(|s| s.files.shift_remove(&name));
        Ok(())
    }

    fn outputs(&self) -> Result<Properties> {
        let fields = ["created_at".to_string(), "updated_at".to_string()];
        self.read(&fields)
    }

    fn exists(&self) -> Result<bool> {
        let name = id_str(self.id.as_ref())?;
        Ok(self.env.with(|s| s.files.contains_key(&name)))
    }

    fn create_complete(&self) -> Result<bool> {
        self.env.poll("file.create_complete")
    }

    fn update_complete(&self) -> Result<bool> {
        self.env.poll("file.update_complete")
    }

    fn delete_complete(&self) -> Result<bool> {
        self.env.poll("file.delete_complete")
    }
}

#[derive(Debug)]
struct ServerResource {
    env: TestEnv,
    id: Option<Value>,
}

impl ServerResource {
    fn index(&self) -> Result<usize> {
        let id = id_str(self.id.as_ref())?;
        id.strip_prefix("server")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("bad server id: {id}"))
    }

    fn record(&self) -> Result<Properties> {
        let index = self.index()?;
        self.env
            .with(|s| s.servers.get(index).cloned().flatten())
            .ok_or_else(|| anyhow!("server{index} does not exist"))
    }
}

impl Resource for ServerResource {
    fn remote_id(&self) -> Option<Value> {
        self.id.clone()
    }

    fn create(&mut self, properties: &Properties) -> Result<()> {
        self.env.check("server.create")?;
        let size = properties.get("size").cloned().unwrap_or(Value::Null);
        let id = self.env.with(|s| {
            let record = object(json!({"size": size, "created_at": s.clock}));
            s.servers.push(Some(record));
            format!("server{}", s.servers.len() - 1)
        });
        self.id = Some(Value::from(id));
        Ok(())
    }

    fn read(&self, fields: &[String]) -> Result<Properties> {
        Ok(pick(&self.record()?, fields))
    }

    fn update(&mut self, _properties: &Properties) -> Result<()> {
        bail!("servers cannot be updated in place")
    }

    fn delete(&mut self) -> Result<()> {
        self.env.check("server.delete")?;
        let index = self.index()?;
        self.env.with(|s| {
            if let Some(slot) = s.servers.get_mut(index) {
                *slot = None;
            }
        });
        Ok(())
    }

    fn outputs(&self) -> Result<Properties> {
        Ok(pick(&self.record()?, &["created_at".to_string()]))
    }

    fn exists(&self) -> Result<bool> {
        let index = self.index()?;
        Ok(self
            .env
            .with(|s| matches!(s.servers.get(index), Some(Some(_)))))
    }

    fn create_complete(&self) -> Result<bool> {
        self.env.poll("server.create_complete")
    }

    fn delete_complete(&self) -> Result<bool> {
        self.env.poll("server.delete_complete")
    }
}

#[derive(Debug)]
struct IpAddressResource {
    env: TestEnv,
    id: Option<Value>,
}

impl Resource for IpAddressResource {
    fn remote_id(&self) -> Option<Value> {
        self.id.clone()
    }

    fn create(&mut self, properties: &Properties) -> Result<()> {
        let server_id = properties.get("server_id").cloned().unwrap_or(Value::Null);
        let address = self.env.with(|s| {
            let address = format!("10.0.0.{}", s.ip_addresses.len() + 1);
            s.ip_addresses.insert(address.clone(), server_id);
            address
        });
        self.id = Some(Value::from(address));
        Ok(())
    }

    fn read(&self, _fields: &[String]) -> Result<Properties> {
        let address = id_str(self.id.as_ref())?;
        let server_id = self
            .env
            .with(|s| s.ip_addresses.get(&address).cloned())
            .ok_or_else(|| anyhow!("no such address: {address}"))?;
        Ok(object(json!({"server_id": server_id})))
    }

    fn update(&mut self, properties: &Properties) -> Result<()> {
        self.env.check("ip_address.update")?;
        let address = id_str(self.id.as_ref())?;
        if let Some(server_id) = properties.get("server_id") {
            self.env.with(|s| {
                s.ip_addresses.insert(address, server_id.clone());
            });
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        let address = id_str(self.id.as_ref())?;
        self.env.with(|s| s.ip_addresses.shift_remove(&address));
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        let address = id_str(self.id.as_ref())?;
        Ok(self.env.with(|s| s.ip_addresses.contains_key(&address)))
    }

    fn update_complete(&self) -> Result<bool> {
        self.env.poll("ip_address.update_complete")
    }
}

#[derive(Debug)]
struct StringJoinerResource {
    env: TestEnv,
    id: Option<Value>,
}

impl Resource for StringJoinerResource {
    fn remote_id(&self) -> Option<Value> {
        self.id.clone()
    }

    fn create(&mut self, properties: &Properties) -> Result<()> {
        let strings = properties.get("strings").cloned().unwrap_or(json!([]));
        let joined = strings
            .as_array()
            .context("strings must be a list")?
            .iter()
            .map(|v| v.as_str().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");
        self.env.with(|s| s.joined.insert(joined.clone(), strings));
        self.id = Some(Value::from(joined));
        Ok(())
    }

    fn read(&self, _fields: &[String]) -> Result<Properties> {
        let id = id_str(self.id.as_ref())?;
        let strings = self.env.with(|s| s.joined.get(&id).cloned());
        Ok(object(json!({"strings": strings})))
    }

    fn update(&mut self, properties: &Properties) -> Result<()> {
        let id = id_str(self.id.as_ref())?;
        if let Some(strings) = properties.get("strings") {
            self.env.with(|s| s.joined.insert(id, strings.clone()));
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<()> {
        let id = id_str(self.id.as_ref())?;
        self.env.with(|s| s.joined.shift_remove(&id));
        Ok(())
    }

    fn outputs(&self) -> Result<Properties> {
        Ok(object(json!({"result": self.id.clone()})))
    }
}
