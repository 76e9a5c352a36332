//! 拓扑索引
//!
//! 将各设备上报的 NUMA 节点压缩为连续的总线序号：观察到的不同 NUMA 值
//! 升序排列后，其排名即为总线序号。查询失败的设备被排除，但不影响整体构建。

use accel_core::{BusOrdinal, DeviceOrdinal, PlatformError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 单个设备的拓扑记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    pub ordinal: DeviceOrdinal,
    pub numa_node: i32,
}

/// 未计入拓扑的设备及原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedDevice {
    pub ordinal: DeviceOrdinal,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyIndex {
    entries: Vec<TopologyEntry>,
    /// 按设备序号索引，被排除的设备为 None
    device_bus: Vec<Option<BusOrdinal>>,
    /// 按总线序号索引，设备序号升序
    bus_devices: Vec<Vec<DeviceOrdinal>>,
}

/// 构建结果：索引本身与被排除的设备
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyBuild {
    pub index: TopologyIndex,
    pub excluded: Vec<ExcludedDevice>,
}

/// 驱动上报的设备数量上限，超过视为异常应答
pub const MAX_DEVICE_COUNT: usize = 1 << 16;

impl TopologyIndex {
    pub fn build<F>(device_count: usize, mut numa_node: F) -> Result<TopologyBuild>
    where
        F: FnMut(DeviceOrdinal) -> anyhow::Result<i32>,
    {
        if device_count > MAX_DEVICE_COUNT {
            return Err(PlatformError::EnumerationFailure(format!(
                "driver reported {device_count} devices, limit is {MAX_DEVICE_COUNT}"
            )));
        }

        let mut entries = Vec::new();
        let mut excluded = Vec::new();

        for ordinal in (0..device_count).map(DeviceOrdinal) {
            match numa_node(ordinal) {
                Ok(node) if node >= 0 => entries.push(TopologyEntry { ordinal, numa_node: node }),
                Ok(node) => {
                    warn!("{} 的 NUMA 节点未知 ({})，不计入总线统计", ordinal, node);
                    excluded.push(ExcludedDevice {
                        ordinal,
                        reason: format!("unknown NUMA node {node}"),
                    });
                }
                Err(e) => {
                    warn!("查询 {} 的 NUMA 节点失败: {:#}", ordinal, e);
                    excluded.push(ExcludedDevice {
                        ordinal,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        let mut nodes: Vec<i32> = entries.iter().map(|e| e.numa_node).collect();
        nodes.sort_unstable();
        nodes.dedup();

        // 只覆盖到最后一个计入的设备，更大的序号查询时按越界处理
        let mut device_bus = vec![None; entries.last().map_or(0, |e| e.ordinal.index() + 1)];
        let mut bus_devices = vec![Vec::new(); nodes.len()];

        // entries 已按序号升序，bus_devices 中的列表自然有序
        for entry in &entries {
            let Ok(rank) = nodes.binary_search(&entry.numa_node) else {
                continue;
            };
            device_bus[entry.ordinal.index()] = Some(BusOrdinal(rank));
            bus_devices[rank].push(entry.ordinal);
        }

        debug!(
            "拓扑构建完成: {} 个设备, {} 条总线, {} 个被排除",
            device_count,
            nodes.len(),
            excluded.len()
        );

        Ok(TopologyBuild {
            index: TopologyIndex {
                entries,
                device_bus,
                bus_devices,
            },
            excluded,
        })
    }

    pub fn bus_count(&self) -> usize {
        self.bus_devices.len()
    }

    pub fn bus_for_device(&self, ordinal: DeviceOrdinal) -> Result<BusOrdinal> {
        self.device_bus
            .get(ordinal.index())
            .copied()
            .flatten()
            .ok_or_else(|| PlatformError::NotFound(format!("no bus recorded for {ordinal}")))
    }

    pub fn first_device_on_bus(&self, bus: BusOrdinal) -> Result<DeviceOrdinal> {
        self.devices_on_bus(bus)?
            .first()
            .copied()
            .ok_or_else(|| PlatformError::NotFound(format!("no devices on {bus}")))
    }

    pub fn devices_on_bus(&self, bus: BusOrdinal) -> Result<&[DeviceOrdinal]> {
        self.bus_devices
            .get(bus.index())
            .map(Vec::as_slice)
            .ok_or_else(|| {
                PlatformError::NotFound(format!("{bus} out of range (bus count {})", self.bus_count()))
            })
    }

    pub fn entries(&self) -> &[TopologyEntry] {
        &self.entries
    }
}
