use async_trait::async_trait;
use kamatera_cloud::remote::{CommandId, CommandStatus, CreatedInstance, InstanceLookup, RemoteClient, RemoteResult};
use kamatera_cloud::wire::{
    WireCapabilities, WireCpuType, WireCreateNetwork, WireCreateServer, WireDatacenter, WireImage,
    WireNetwork, WireNetworkCreated, WireServer, WireServerNetwork, WireSubnet, WireSubnetWrite,
};
use kamatera_cloud::{
    ComputeInstanceState, InstanceId, NetworkId, PollPolicy, PowerState, RemoteError,
    ServerOperation, mapper,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

pub const IMAGE_ID: &str = "IL-PT:6000C2987c9641e8d4a1fc7ae8a3bcae";

/// Millisecond polling for tests
pub fn fast_poll() -> PollPolicy {
    PollPolicy::fixed(Duration::from_millis(5), Duration::from_millis(500))
}

struct FakeNetwork {
    vlan_id: u64,
    network_id: u64,
    full_name: String,
    subnets: Vec<WireSubnet>,
}

#[derive(Default)]
struct FakeState {
    servers: BTreeMap<String, WireServer>,
    commands: HashMap<String, CommandStatus>,
    networks: BTreeMap<String, Vec<FakeNetwork>>,
    next_id: u64,

    /// Server reads that report nothing right after a create
    invisible_reads: usize,
    hang_commands: bool,

    /// Commands that still complete before every later one fails
    fail_after: Option<usize>,
}

/// In-memory control plane recording every call
pub struct FakeKamatera {
    state: Mutex<FakeState>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

#[allow(dead_code)]
impl FakeKamatera {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..Default::default()
            }),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Commands stay pending forever
    pub fn hang_commands(&self) {
        self.state.lock().unwrap().hang_commands = true;
    }

    /// Commands complete with an error log
    pub fn fail_commands(&self) {
        self.fail_commands_after(0);
    }

    /// The next `completed` commands succeed, later ones fail
    pub fn fail_commands_after(&self, completed: usize) {
        self.state.lock().unwrap().fail_after = Some(completed);
    }

    /// Created servers stay invisible for the given number of reads
    pub fn delay_visibility(&self, reads: usize) {
        self.state.lock().unwrap().invisible_reads = reads;
    }

    /// Insert a server that was not created through this client
    pub fn seed_server(&self, server: WireServer) {
        self.state
            .lock()
            .unwrap()
            .servers
            .insert(server.id.clone(), server);
    }

    /// Insert an existing private network with one subnet
    pub fn seed_network(&self, datacenter: &str, short_name: &str) -> NetworkId {
        let mut state = self.state.lock().unwrap();
        let vlan_id = state.bump();
        let network_id = state.bump();
        let subnet_id = state.bump();
        state
            .networks
            .entry(datacenter.to_string())
            .or_default()
            .push(FakeNetwork {
                vlan_id,
                network_id,
                full_name: format!("lan-{vlan_id}-{short_name}"),
                subnets: vec![WireSubnet {
                    subnet_id,
                    subnet_ip: "172.16.0.0".into(),
                    subnet_bit: 23,
                    gateway: String::new(),
                    dns1: String::new(),
                    dns2: String::new(),
                    subnet_description: "default".into(),
                }],
            });
        NetworkId(vlan_id)
    }

    pub fn full_network_name(&self, datacenter: &str, id: NetworkId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .networks
            .get(datacenter)?
            .iter()
            .find(|n| n.vlan_id == id.0)
            .map(|n| n.full_name.clone())
    }

    pub fn server_count(&self) -> usize {
        self.state.lock().unwrap().servers.len()
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn record(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }
}

impl FakeState {
    fn bump(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn queue(&mut self, log: String) -> CommandId {
        let id = self.bump().to_string();
        let status = if self.hang_commands {
            CommandStatus::Pending
        } else if self.fail_after == Some(0) {
            CommandStatus::Failed {
                log: Some("Error: operation failed".into()),
            }
        } else {
            if let Some(remaining) = self.fail_after.as_mut() {
                *remaining -= 1;
            }
            CommandStatus::Complete { log: Some(log) }
        };
        self.commands.insert(id.clone(), status);
        CommandId(id)
    }

    fn server_mut(&mut self, id: &InstanceId) -> RemoteResult<&mut WireServer> {
        self.servers
            .get_mut(&id.0)
            .ok_or_else(|| RemoteError::NotFound("No servers found".into()))
    }
}

fn name_matches(filter: &str, name: &str) -> bool {
    match filter.strip_prefix('^').and_then(|f| f.strip_suffix('$')) {
        Some(exact) => exact.replace('\\', "") == name,
        None => name.contains(filter),
    }
}

fn parse_disks(disk: &str) -> Vec<f64> {
    disk.split_whitespace()
        .filter_map(|d| d.strip_prefix("size="))
        .filter_map(|d| d.parse().ok())
        .collect()
}

fn parse_gb(value: &str) -> f64 {
    value.trim_end_matches("gb").parse().unwrap_or(0.0)
}

fn flag(value: &str) -> String {
    if value == "yes" { "1" } else { "0" }.to_string()
}

#[async_trait]
impl RemoteClient for FakeKamatera {
    async fn create_instance(&self, request: &WireCreateServer) -> RemoteResult<CreatedInstance> {
        self.record("create_instance");
        let mut state = self.state.lock().unwrap();

        if state.servers.values().any(|s| s.name == request.name) {
            return Err(RemoteError::ConflictDuplicate {
                kind: "server",
                name: request.name.clone(),
            });
        }

        let id = format!("srv{}", state.bump());
        let mut networks = Vec::new();
        for entry in request.network.split_whitespace() {
            let name = entry
                .split(',')
                .find_map(|kv| kv.strip_prefix("name="))
                .unwrap_or("wan");
            let octet = state.bump() % 250;
            networks.push(if name == "wan" {
                WireServerNetwork {
                    network: format!("wan-{}", request.datacenter.to_lowercase()),
                    ips: vec![format!("203.0.113.{octet}")],
                }
            } else {
                WireServerNetwork {
                    network: name.to_string(),
                    ips: vec![format!("172.16.0.{octet}")],
                }
            });
        }

        state.servers.insert(
            id.clone(),
            WireServer {
                id: id.clone(),
                name: request.name.clone(),
                datacenter: request.datacenter.clone(),
                cpu: request.cpu.clone(),
                ram: request.ram as f64,
                disk_sizes: parse_disks(&request.disk),
                power: if request.poweronaftercreate == "yes" { "on" } else { "off" }.into(),
                networks,
                billing: request.billingcycle.clone(),
                traffic: request.monthlypackage.clone(),
                managed: flag(&request.managed),
                backup: flag(&request.dailybackup),
                price_monthly_on: Some("14.00".into()),
                price_hourly_on: Some("0.019".into()),
                price_hourly_off: Some("0.001".into()),
            },
        );

        let command = state.queue(format!("Creating server\nName: {}\nDone", request.name));
        let generated_password =
            (request.password == "__generate__").then(|| format!("gen-{id}"));
        Ok(CreatedInstance {
            commands: vec![command],
            generated_password,
            adopted: None,
        })
    }

    async fn read_instance(&self, lookup: &InstanceLookup) -> RemoteResult<Vec<ComputeInstanceState>> {
        self.record("read_instance");
        let mut state = self.state.lock().unwrap();
        if state.invisible_reads > 0 {
            state.invisible_reads -= 1;
            return Err(RemoteError::NotFound("No servers found".into()));
        }

        let matched: Vec<WireServer> = state
            .servers
            .values()
            .filter(|s| match lookup {
                InstanceLookup::Id(id) => s.id == id.0,
                InstanceLookup::NameFilter(filter) => name_matches(filter, &s.name),
            })
            .cloned()
            .collect();
        if matched.is_empty() {
            return Err(RemoteError::NotFound("No servers found".into()));
        }
        matched.into_iter().map(mapper::from_wire_state).collect()
    }

    async fn update_instance(
        &self,
        id: &InstanceId,
        operation: &ServerOperation,
    ) -> RemoteResult<CommandId> {
        self.record("update_instance");
        let mut state = self.state.lock().unwrap();
        let server = state.server_mut(id)?;

        if let Some(configure) = mapper::to_wire_configure(id, operation) {
            if let Some(cpu) = configure.cpu {
                server.cpu = cpu;
            }
            if let Some(ram) = configure.ram {
                server.ram = ram as f64;
            }
            if let Some(cycle) = configure.billingcycle {
                server.billing = cycle;
                server.traffic = configure.monthlypackage.unwrap_or_default();
            }
            if let Some(backup) = configure.dailybackup {
                server.backup = flag(&backup);
            }
            if let Some(managed) = configure.managed {
                server.managed = flag(&managed);
            }
        } else if let Some(disk) = mapper::to_wire_disk_change(id, operation) {
            if let Some(add) = disk.add {
                server.disk_sizes.push(parse_gb(&add));
            }
            if let (Some(index), Some(size)) = (disk.resize, disk.size) {
                let index: usize = index.parse().unwrap_or(0);
                if let Some(slot) = server.disk_sizes.get_mut(index) {
                    *slot = parse_gb(&size);
                }
            }
        } else if let ServerOperation::Rename { name } = operation {
            server.name = name.clone();
        }

        Ok(state.queue("Done".into()))
    }

    async fn set_power(&self, id: &InstanceId, power: PowerState) -> RemoteResult<CommandId> {
        self.record("set_power");
        let mut state = self.state.lock().unwrap();
        state.server_mut(id)?.power = power.to_string();
        Ok(state.queue("Done".into()))
    }

    async fn destroy_instance(&self, id: &InstanceId) -> RemoteResult<CommandId> {
        self.record("destroy_instance");
        let mut state = self.state.lock().unwrap();
        if state.servers.remove(&id.0).is_none() {
            return Err(RemoteError::NotFound("No servers found".into()));
        }
        Ok(state.queue("Terminated".into()))
    }

    async fn command_status(&self, id: &CommandId) -> RemoteResult<CommandStatus> {
        self.record("command_status");
        let state = self.state.lock().unwrap();
        state
            .commands
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RemoteError::InvalidResponse(format!("unknown command {id}")))
    }

    async fn list_datacenters(&self) -> RemoteResult<Vec<WireDatacenter>> {
        self.record("list_datacenters");
        Ok(vec![
            WireDatacenter {
                id: "IL-PT".into(),
                sub_category: "Petach Tikva".into(),
                name: "Israel".into(),
            },
            WireDatacenter {
                id: "IL-TA".into(),
                sub_category: "Tel Aviv".into(),
                name: "Israel".into(),
            },
            WireDatacenter {
                id: "EU".into(),
                sub_category: "Amsterdam".into(),
                name: "Netherlands".into(),
            },
        ])
    }

    async fn list_images(&self, datacenter: &str) -> RemoteResult<Vec<WireImage>> {
        self.record("list_images");
        Ok(vec![
            WireImage {
                id: format!("{datacenter}:6000C2987c9641e8d4a1fc7ae8a3bcae"),
                os: "Ubuntu".into(),
                code: "18.04 64bit".into(),
                name: "Ubuntu 18.04 64-bit".into(),
            },
            WireImage {
                id: format!("{datacenter}:6000C29a5a7c2b6bd6e8b2d4a0a0b9f1"),
                os: "Ubuntu".into(),
                code: "20.04 64bit".into(),
                name: "Ubuntu 20.04 64-bit".into(),
            },
        ])
    }

    async fn capabilities(&self, _datacenter: &str) -> RemoteResult<WireCapabilities> {
        self.record("capabilities");
        Ok(WireCapabilities {
            cpu_types: vec![WireCpuType {
                id: "B".into(),
                name: "Type B - General Purpose".into(),
                cpu_cores: vec![1.0, 2.0, 4.0],
                ram_mb: vec![1024.0, 2048.0, 4096.0],
            }],
            monthly_traffic_package: [("t5000".to_string(), "5000GB/month".to_string())]
                .into_iter()
                .collect(),
            disk_size_gb: vec![10.0, 20.0, 50.0],
            default_monthly_traffic_package: Some("t5000".into()),
        })
    }

    async fn create_network(&self, request: &WireCreateNetwork) -> RemoteResult<WireNetworkCreated> {
        self.record("create_network");
        let mut state = self.state.lock().unwrap();
        let vlan_id = state.bump();
        let network_id = state.bump();
        let subnet_id = state.bump();
        state
            .networks
            .entry(request.datacenter.clone())
            .or_default()
            .push(FakeNetwork {
                vlan_id,
                network_id,
                full_name: format!("lan-{vlan_id}-{}", request.name),
                subnets: vec![WireSubnet {
                    subnet_id,
                    subnet_ip: request.subnet_ip.clone(),
                    subnet_bit: request.subnet_bit,
                    gateway: request.gateway.clone(),
                    dns1: request.dns1.clone(),
                    dns2: request.dns2.clone(),
                    subnet_description: request.subnet_description.clone(),
                }],
            });
        Ok(WireNetworkCreated {
            network_id: Some(vlan_id),
            subnet_id,
        })
    }

    async fn read_networks(&self, datacenter: &str) -> RemoteResult<Vec<WireNetwork>> {
        self.record("read_networks");
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .get(datacenter)
            .map(|networks| {
                networks
                    .iter()
                    .map(|n| WireNetwork {
                        vlan_id: n.vlan_id,
                        ids: vec![n.network_id],
                        names: vec![n.full_name.clone()],
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_subnets(&self, datacenter: &str, network: NetworkId) -> RemoteResult<Vec<WireSubnet>> {
        self.record("list_subnets");
        let state = self.state.lock().unwrap();
        state
            .networks
            .get(datacenter)
            .and_then(|networks| networks.iter().find(|n| n.vlan_id == network.0))
            .map(|n| n.subnets.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("no network {network}")))
    }

    async fn create_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<u64> {
        self.record("create_subnet");
        let mut state = self.state.lock().unwrap();
        let subnet_id = state.bump();
        let network = find_network_mut(&mut state, &request.datacenter, &request.vlan_id)?;
        network.subnets.push(subnet_from_write(subnet_id, request));
        Ok(subnet_id)
    }

    async fn edit_subnet(&self, request: &WireSubnetWrite) -> RemoteResult<()> {
        self.record("edit_subnet");
        let mut state = self.state.lock().unwrap();
        let network = find_network_mut(&mut state, &request.datacenter, &request.vlan_id)?;
        let subnet_id = request
            .subnet_id
            .ok_or_else(|| RemoteError::Rejected {
                status: 400,
                message: "subnetId is required".into(),
            })?;
        let slot = network
            .subnets
            .iter_mut()
            .find(|s| s.subnet_id == subnet_id)
            .ok_or_else(|| RemoteError::NotFound(format!("no subnet {subnet_id}")))?;
        *slot = subnet_from_write(subnet_id, request);
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: u64) -> RemoteResult<()> {
        self.record("delete_subnet");
        let mut state = self.state.lock().unwrap();
        for network in state.networks.values_mut().flatten() {
            network.subnets.retain(|s| s.subnet_id != subnet_id);
        }
        Ok(())
    }

    async fn destroy_network(&self, datacenter: &str, network_id: u64) -> RemoteResult<()> {
        self.record("destroy_network");
        let mut state = self.state.lock().unwrap();
        let networks = state
            .networks
            .get_mut(datacenter)
            .ok_or_else(|| RemoteError::NotFound(format!("no networks in {datacenter}")))?;
        if networks.iter().any(|n| n.network_id == network_id && !n.subnets.is_empty()) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "network still has subnets".into(),
            });
        }
        networks.retain(|n| n.network_id != network_id);
        Ok(())
    }
}

fn find_network_mut<'a>(
    state: &'a mut FakeState,
    datacenter: &str,
    vlan_id: &str,
) -> RemoteResult<&'a mut FakeNetwork> {
    state
        .networks
        .get_mut(datacenter)
        .and_then(|networks| networks.iter_mut().find(|n| n.vlan_id.to_string() == vlan_id))
        .ok_or_else(|| RemoteError::NotFound(format!("no network {vlan_id}")))
}

fn subnet_from_write(subnet_id: u64, request: &WireSubnetWrite) -> WireSubnet {
    WireSubnet {
        subnet_id,
        subnet_ip: request.subnet_ip.clone(),
        subnet_bit: request.subnet_bit,
        gateway: request.gateway.clone(),
        dns1: request.dns1.clone(),
        dns2: request.dns2.clone(),
        subnet_description: request.subnet_description.clone(),
    }
}
