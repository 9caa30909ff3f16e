//! リソースモデルのマッパー
//!
//! [`crate::model`] のドメインレコードと [`crate::wire`] のワイヤ形式を相互変換し、
//! 観測されたサーバーを望ましい状態へ移す [`OperationPlan`] を計算する。
//!
//! [`diff`] が使う属性の分類:
//!
//! | class | attributes |
//! |---|---|
//! | immutable | datacenter, boot disk growth, image, networks, ssh key, startup script |
//! | in place | name, password, cpu type and cores, RAM, billing and traffic, backup, managed, extra disks |
//! | power only | power state |
//!
//! ディスクの縮小・削除は次のエラーで拒否する:
//! [`ValidationError::UnsupportedChange`].

use crate::action::{OperationPlan, PlannedChange, ServerOperation};
use crate::error::{RemoteError, ValidationError};
use crate::model::{
    AttachedNetwork, BillingCycle, ComputeInstanceSpec, ComputeInstanceState, GENERATE_PASSWORD,
    InstanceId, NetworkId, NetworkSpec, NetworkState, ObservedSubnet, PowerState, Prices,
    SubnetSpec,
};
use crate::wire::{
    WireConfigure, WireCreateNetwork, WireCreateServer, WireDiskChange, WireNetwork, WireServer,
    WireSubnet, WireSubnetWrite,
};

/// 望ましいサーバーから作成リクエストを組み立てる
pub fn to_wire_create(spec: &ComputeInstanceSpec) -> WireCreateServer {
    let password = spec
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| GENERATE_PASSWORD.to_string());

    let disk = spec
        .disk_sizes_gb
        .iter()
        .map(|gb| format!("size={gb}"))
        .collect::<Vec<_>>()
        .join(" ");

    let network = if spec.networks.is_empty() {
        "name=wan,ip=auto".to_string()
    } else {
        spec.networks
            .iter()
            .map(|n| format!("name={},ip={}", n.name, n.ip.as_deref().unwrap_or("auto")))
            .collect::<Vec<_>>()
            .join(" ")
    };

    WireCreateServer {
        name: spec.name.clone(),
        password_validate: password.clone(),
        password,
        ssh_key: spec.ssh_pubkey.clone().unwrap_or_default(),
        datacenter: spec.datacenter.clone(),
        image: spec.image_id.clone(),
        cpu: spec.cpu_label(),
        ram: spec.ram_mb,
        disk,
        dailybackup: yes_no(spec.daily_backup),
        managed: yes_no(spec.managed),
        network,
        quantity: "1".to_string(),
        billingcycle: spec.billing_cycle.to_string(),
        monthlypackage: spec.monthly_traffic_package.clone().unwrap_or_default(),
        poweronaftercreate: yes_no(spec.power_on),
        script_file: spec.startup_script.clone().unwrap_or_default(),
    }
}

/// サーバー情報を観測状態に変換
pub fn from_wire_state(wire: WireServer) -> Result<ComputeInstanceState, RemoteError> {
    let (cpu_cores, cpu_type) = split_cpu_label(&wire.cpu)?;

    let power = match wire.power.as_str() {
        "on" => PowerState::On,
        "off" => PowerState::Off,
        other => {
            return Err(RemoteError::InvalidResponse(format!(
                "unknown power state '{other}' for server {}",
                wire.id
            )));
        }
    };

    let billing_cycle = if wire.billing.is_empty() {
        Default::default()
    } else {
        wire.billing.parse().map_err(RemoteError::InvalidResponse)?
    };
    let traffic_package = Some(wire.traffic.clone()).filter(|t| !t.is_empty());

    let networks = wire
        .networks
        .into_iter()
        .map(|n| {
            let is_public = n.network.starts_with("wan-");
            AttachedNetwork {
                network: n.network,
                ips: n.ips,
                traffic_class: if is_public { traffic_package.clone() } else { None },
            }
        })
        .collect();

    Ok(ComputeInstanceState {
        id: InstanceId(wire.id),
        name: wire.name,
        datacenter: wire.datacenter,
        cpu_label: wire.cpu,
        cpu_type,
        cpu_cores,
        ram_mb: wire.ram as u32,
        disk_sizes_gb: wire.disk_sizes.iter().map(|gb| *gb as u32).collect(),
        power,
        networks,
        billing_cycle,
        traffic_package,
        managed: wire.managed == "1",
        daily_backup: wire.backup == "1",
        prices: Prices {
            monthly_on: wire.price_monthly_on,
            hourly_on: wire.price_hourly_on,
            hourly_off: wire.price_hourly_off,
        },
    })
}

/// `12D` のようなCPUラベルをコア数とタイプに分割
pub fn split_cpu_label(label: &str) -> Result<(u32, String), RemoteError> {
    let invalid = || RemoteError::InvalidResponse(format!("invalid CPU label '{label}'"));

    let split = label
        .char_indices()
        .last()
        .map(|(idx, _)| idx)
        .ok_or_else(invalid)?;
    let (cores, cpu_type) = label.split_at(split);
    let cores = cores.parse::<u32>().map_err(|_| invalid())?;
    if !cpu_type.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    Ok((cores, cpu_type.to_string()))
}

/// Plan the changes that move `state` to `spec`.
///
/// Attributes that are not observable on the server (image, networks, ssh
/// key, startup script, password) are compared by [`diff_applied`].
pub fn diff(
    spec: &ComputeInstanceSpec,
    state: &ComputeInstanceState,
) -> Result<OperationPlan, ValidationError> {
    let mut changes = Vec::new();

    if spec.datacenter != state.datacenter {
        changes.push(PlannedChange::immutable(
            "datacenter",
            format!("datacenter {} -> {}", state.datacenter, spec.datacenter),
        ));
    }

    if spec.name != state.name {
        changes.push(PlannedChange::in_place(
            "name",
            format!("rename {} -> {}", state.name, spec.name),
            ServerOperation::Rename {
                name: spec.name.clone(),
            },
        ));
    }

    if spec.cpu_type != state.cpu_type || spec.cpu_cores != state.cpu_cores {
        changes.push(PlannedChange::in_place(
            "cpu",
            format!("cpu {} -> {}", state.cpu_label, spec.cpu_label()),
            ServerOperation::SetCpu {
                cpu_type: spec.cpu_type.clone(),
                cores: spec.cpu_cores,
            },
        ));
    }

    if spec.ram_mb != state.ram_mb {
        changes.push(PlannedChange::in_place(
            "ram_mb",
            format!("ram {} MB -> {} MB", state.ram_mb, spec.ram_mb),
            ServerOperation::SetRam { ram_mb: spec.ram_mb },
        ));
    }

    let traffic_changed = spec
        .monthly_traffic_package
        .as_ref()
        .is_some_and(|p| state.traffic_package.as_ref() != Some(p));
    if spec.billing_cycle != state.billing_cycle || traffic_changed {
        changes.push(PlannedChange::in_place(
            "billing_cycle",
            format!("billing {} -> {}", state.billing_cycle, spec.billing_cycle),
            ServerOperation::SetBilling {
                cycle: spec.billing_cycle,
                traffic_package: match spec.billing_cycle {
                    BillingCycle::Hourly => None,
                    BillingCycle::Monthly => spec
                        .monthly_traffic_package
                        .clone()
                        .or_else(|| state.traffic_package.clone()),
                },
            },
        ));
    }

    if spec.daily_backup != state.daily_backup {
        changes.push(PlannedChange::in_place(
            "daily_backup",
            format!("daily backup {}", on_off(spec.daily_backup)),
            ServerOperation::SetDailyBackup {
                enabled: spec.daily_backup,
            },
        ));
    }

    if spec.managed != state.managed {
        changes.push(PlannedChange::in_place(
            "managed",
            format!("managed {}", on_off(spec.managed)),
            ServerOperation::SetManaged {
                enabled: spec.managed,
            },
        ));
    }

    changes.extend(disk_changes(&spec.disk_sizes_gb, &state.disk_sizes_gb)?);

    if spec.desired_power() != state.power {
        changes.push(PlannedChange::power(spec.desired_power()));
    }

    Ok(OperationPlan::new(changes))
}

fn disk_changes(desired: &[u32], observed: &[u32]) -> Result<Vec<PlannedChange>, ValidationError> {
    if desired.len() < observed.len() {
        return Err(ValidationError::UnsupportedChange {
            field: "disk_sizes_gb".to_string(),
            reason: format!(
                "disks cannot be removed ({} attached, {} requested)",
                observed.len(),
                desired.len()
            ),
        });
    }

    let mut changes = Vec::new();
    for (index, size_gb) in desired.iter().copied().enumerate() {
        match observed.get(index).copied() {
            Some(current) if size_gb < current => {
                return Err(ValidationError::UnsupportedChange {
                    field: "disk_sizes_gb".to_string(),
                    reason: format!(
                        "disk {index} cannot shrink from {current} GB to {size_gb} GB"
                    ),
                });
            }
            Some(current) if size_gb > current && index == 0 => {
                changes.push(PlannedChange::immutable(
                    "disk_sizes_gb",
                    format!("boot disk {current} GB -> {size_gb} GB"),
                ));
            }
            Some(current) if size_gb > current => {
                changes.push(PlannedChange::in_place(
                    "disk_sizes_gb",
                    format!("disk {index} {current} GB -> {size_gb} GB"),
                    ServerOperation::ResizeDisk { index, size_gb },
                ));
            }
            Some(_) => {}
            None => {
                changes.push(PlannedChange::in_place(
                    "disk_sizes_gb",
                    format!("add disk {size_gb} GB"),
                    ServerOperation::AddDisk { size_gb },
                ));
            }
        }
    }
    Ok(changes)
}

/// Compare attributes the server does not report against the last applied spec
pub fn diff_applied(applied: &ComputeInstanceSpec, desired: &ComputeInstanceSpec) -> Vec<PlannedChange> {
    let mut changes = Vec::new();

    if applied.image_id != desired.image_id {
        changes.push(PlannedChange::immutable(
            "image_id",
            format!("image {} -> {}", applied.image_id, desired.image_id),
        ));
    }
    if applied.networks != desired.networks {
        changes.push(PlannedChange::immutable("networks", "network attachments changed"));
    }
    if applied.ssh_pubkey != desired.ssh_pubkey {
        changes.push(PlannedChange::immutable("ssh_pubkey", "ssh key changed"));
    }
    if applied.startup_script != desired.startup_script {
        changes.push(PlannedChange::immutable("startup_script", "startup script changed"));
    }

    let new_password = desired
        .password
        .as_ref()
        .filter(|p| !p.is_empty() && applied.password.as_ref() != Some(*p));
    if let Some(password) = new_password {
        changes.push(PlannedChange::in_place(
            "password",
            "change password",
            ServerOperation::ChangePassword {
                password: password.clone(),
            },
        ));
    }

    changes
}

/// Configure body for a single in-place operation, `None` for other endpoints
pub fn to_wire_configure(id: &InstanceId, operation: &ServerOperation) -> Option<WireConfigure> {
    let base = WireConfigure {
        id: id.0.clone(),
        ..Default::default()
    };
    let body = match operation {
        ServerOperation::SetCpu { cpu_type, cores } => WireConfigure {
            cpu: Some(format!("{cores}{cpu_type}")),
            ..base
        },
        ServerOperation::SetRam { ram_mb } => WireConfigure {
            ram: Some(*ram_mb),
            ..base
        },
        ServerOperation::SetBilling {
            cycle,
            traffic_package,
        } => WireConfigure {
            billingcycle: Some(cycle.to_string()),
            monthlypackage: traffic_package.clone(),
            ..base
        },
        ServerOperation::SetDailyBackup { enabled } => WireConfigure {
            dailybackup: Some(yes_no(*enabled)),
            ..base
        },
        ServerOperation::SetManaged { enabled } => WireConfigure {
            managed: Some(yes_no(*enabled)),
            ..base
        },
        _ => return None,
    };
    Some(body)
}

/// Disk body for a disk operation, `None` for other operations
pub fn to_wire_disk_change(id: &InstanceId, operation: &ServerOperation) -> Option<WireDiskChange> {
    match operation {
        ServerOperation::AddDisk { size_gb } => Some(WireDiskChange {
            id: id.0.clone(),
            add: Some(format!("{size_gb}gb")),
            ..Default::default()
        }),
        ServerOperation::ResizeDisk { index, size_gb } => Some(WireDiskChange {
            id: id.0.clone(),
            resize: Some(index.to_string()),
            size: Some(format!("{size_gb}gb")),
            ..Default::default()
        }),
        _ => None,
    }
}

/// Create body carrying the first subnet of a network
pub fn to_wire_create_network(spec: &NetworkSpec) -> Option<WireCreateNetwork> {
    let first = spec.subnets.first()?;
    Some(WireCreateNetwork {
        datacenter: spec.datacenter.clone(),
        name: spec.name.clone(),
        subnet_ip: first.ip.clone(),
        subnet_bit: first.bit,
        gateway: first.gateway.clone(),
        dns1: first.dns1.clone(),
        dns2: first.dns2.clone(),
        subnet_description: first.description.clone(),
    })
}

pub fn to_wire_subnet(
    datacenter: &str,
    network: NetworkId,
    subnet_id: Option<u64>,
    subnet: &SubnetSpec,
) -> WireSubnetWrite {
    WireSubnetWrite {
        datacenter: datacenter.to_string(),
        vlan_id: network.to_string(),
        subnet_id,
        subnet_ip: subnet.ip.clone(),
        subnet_bit: subnet.bit,
        gateway: subnet.gateway.clone(),
        dns1: subnet.dns1.clone(),
        dns2: subnet.dns2.clone(),
        subnet_description: subnet.description.clone(),
    }
}

/// Convert a network listing entry and its subnets into observed state
pub fn from_wire_network(
    datacenter: &str,
    wire: &WireNetwork,
    subnets: Vec<WireSubnet>,
) -> Result<NetworkState, RemoteError> {
    let [network_id] = wire.ids.as_slice() else {
        return Err(RemoteError::InvalidResponse(
            "invalid ids returned from network list".to_string(),
        ));
    };
    let [full_name] = wire.names.as_slice() else {
        return Err(RemoteError::InvalidResponse(
            "invalid names returned from network list".to_string(),
        ));
    };

    Ok(NetworkState {
        id: NetworkId(wire.vlan_id),
        datacenter: datacenter.to_string(),
        name: short_network_name(full_name),
        full_name: full_name.clone(),
        network_id: *network_id,
        subnets: subnets
            .into_iter()
            .map(|s| ObservedSubnet {
                id: s.subnet_id,
                subnet: SubnetSpec {
                    ip: s.subnet_ip,
                    bit: s.subnet_bit,
                    gateway: s.gateway,
                    dns1: s.dns1,
                    dns2: s.dns2,
                    description: s.subnet_description,
                },
            })
            .collect(),
    })
}

/// `lan-12345-backend` -> `backend`
pub fn short_network_name(full_name: &str) -> String {
    full_name.splitn(3, '-').nth(2).unwrap_or(full_name).to_string()
}

fn yes_no(flag: bool) -> String {
    if flag { "yes" } else { "no" }.to_string()
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}
