// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Static metric catalog: the only source of truth for what Describe reports.
//!
//! Naming scheme:
//! - basic metrics are `rds_basic_<cloudwatch name in snake case>[_unit]` and carry the
//!   `instance` and `region` labels;
//! - enhanced metrics are `rds_enhanced_<section>_<field>[_unit]`. Fields of object sections
//!   (`cpuUtilization`, `memory`, ...) carry `instance` and `region`; fields of list sections add
//!   the entry's identity: `interface` for `network`, `device` for `diskIO`, `name` and
//!   `mount_point` for `fileSys`, `process` and `pid` for `processList`.
//!
//! Adding, removing or renaming an entry changes the Describe cardinality and is a breaking
//! change for dashboards.

use crate::config::Instance;
use crate::sample::{MetricDescriptor, MetricKind};

pub const INSTANCE_LABEL: &str = "instance";
pub const REGION_LABEL: &str = "region";

const INSTANCE_LABELS: &[&str] = &[INSTANCE_LABEL, REGION_LABEL];
const NETWORK_LABELS: &[&str] = &[INSTANCE_LABEL, REGION_LABEL, "interface"];
const DISK_LABELS: &[&str] = &[INSTANCE_LABEL, REGION_LABEL, "device"];
const FILESYSTEM_LABELS: &[&str] = &[INSTANCE_LABEL, REGION_LABEL, "name", "mount_point"];
const PROCESS_LABELS: &[&str] = &[INSTANCE_LABEL, REGION_LABEL, "process", "pid"];

/// Monitoring mode a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Mode {
    #[display("basic")]
    Basic,
    #[display("enhanced")]
    Enhanced,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Basic, Mode::Enhanced];
}

/// Where the value of a metric is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A CloudWatch `AWS/RDS` metric name.
    CloudWatch(&'static str),
    /// A numeric field of an object section, or of the payload root when `section` is `None`.
    Field {
        section: Option<&'static str>,
        field: &'static str,
    },
    /// A numeric field of every entry of a list section.
    Entry {
        section: &'static str,
        field: &'static str,
    },
}

/// Identity labels of the entries of a list section: `(label name, entry key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSection {
    pub section: &'static str,
    pub identity: &'static [(&'static str, &'static str)],
}

pub const LIST_SECTIONS: &[ListSection] = &[
    ListSection {
        section: "network",
        identity: &[("interface", "interface")],
    },
    ListSection {
        section: "diskIO",
        identity: &[("device", "device")],
    },
    ListSection {
        section: "fileSys",
        identity: &[("name", "name"), ("mount_point", "mountPoint")],
    },
    ListSection {
        section: "processList",
        identity: &[("process", "name"), ("pid", "id")],
    },
];

pub fn list_section(section: &str) -> Option<&'static ListSection> {
    LIST_SECTIONS.iter().find(|s| s.section == section)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub mode: Mode,
    pub source: Source,
    pub labels: &'static [&'static str],
}

impl MetricDefinition {
    pub fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            name: self.name,
            help: self.help,
            kind: self.kind,
            labels: self.labels,
        }
    }
}

const fn basic(cloudwatch: &'static str, name: &'static str, help: &'static str) -> MetricDefinition {
    MetricDefinition {
        name,
        help,
        kind: MetricKind::Gauge,
        mode: Mode::Basic,
        source: Source::CloudWatch(cloudwatch),
        labels: INSTANCE_LABELS,
    }
}

const fn field(
    section: Option<&'static str>,
    field: &'static str,
    name: &'static str,
    help: &'static str,
) -> MetricDefinition {
    MetricDefinition {
        name,
        help,
        kind: MetricKind::Gauge,
        mode: Mode::Enhanced,
        source: Source::Field { section, field },
        labels: INSTANCE_LABELS,
    }
}

const fn entry(
    section: &'static str,
    field: &'static str,
    labels: &'static [&'static str],
    name: &'static str,
    help: &'static str,
) -> MetricDefinition {
    MetricDefinition {
        name,
        help,
        kind: MetricKind::Gauge,
        mode: Mode::Enhanced,
        source: Source::Entry { section, field },
        labels,
    }
}

static BASIC: &[MetricDefinition] = &[
    basic("BinLogDiskUsage", "rds_basic_bin_log_disk_usage_bytes", "Amount of disk space occupied by binary logs."),
    basic("BurstBalance", "rds_basic_burst_balance_percent", "Percent of General Purpose SSD burst-bucket I/O credits available."),
    basic("CPUCreditBalance", "rds_basic_cpu_credit_balance", "Number of earned CPU credits accumulated by a burstable instance."),
    basic("CPUCreditUsage", "rds_basic_cpu_credit_usage", "Number of CPU credits spent by a burstable instance."),
    basic("CPUUtilization", "rds_basic_cpu_utilization_percent", "Percentage of CPU utilization."),
    basic("DatabaseConnections", "rds_basic_database_connections", "Number of client network connections to the database instance."),
    basic("DiskQueueDepth", "rds_basic_disk_queue_depth", "Number of outstanding I/Os waiting to access the disk."),
    basic("FreeStorageSpace", "rds_basic_free_storage_space_bytes", "Amount of available storage space."),
    basic("FreeableMemory", "rds_basic_freeable_memory_bytes", "Amount of available random access memory."),
    basic("MaximumUsedTransactionIDs", "rds_basic_maximum_used_transaction_ids", "Maximum transaction IDs that have been used."),
    basic("NetworkReceiveThroughput", "rds_basic_network_receive_throughput_bytes_per_second", "Incoming network traffic on the instance."),
    basic("NetworkTransmitThroughput", "rds_basic_network_transmit_throughput_bytes_per_second", "Outgoing network traffic on the instance."),
    basic("OldestReplicationSlotLag", "rds_basic_oldest_replication_slot_lag_bytes", "Lagging size of the replica lagging the most in terms of WAL data received."),
    basic("ReadIOPS", "rds_basic_read_iops", "Average number of disk read I/O operations per second."),
    basic("ReadLatency", "rds_basic_read_latency_seconds", "Average amount of time taken per disk read I/O operation."),
    basic("ReadThroughput", "rds_basic_read_throughput_bytes_per_second", "Average number of bytes read from disk per second."),
    basic("ReplicaLag", "rds_basic_replica_lag_seconds", "Amount of time a read replica lags behind the source instance."),
    basic("ReplicationSlotDiskUsage", "rds_basic_replication_slot_disk_usage_bytes", "Disk space used by replication slot files."),
    basic("SwapUsage", "rds_basic_swap_usage_bytes", "Amount of swap space used on the instance."),
    basic("TransactionLogsDiskUsage", "rds_basic_transaction_logs_disk_usage_bytes", "Disk space used by transaction logs."),
    basic("TransactionLogsGeneration", "rds_basic_transaction_logs_generation_bytes_per_second", "Size of transaction logs generated per second."),
    basic("WriteIOPS", "rds_basic_write_iops", "Average number of disk write I/O operations per second."),
    basic("WriteLatency", "rds_basic_write_latency_seconds", "Average amount of time taken per disk write I/O operation."),
    basic("WriteThroughput", "rds_basic_write_throughput_bytes_per_second", "Average number of bytes written to disk per second."),
];

const CPU: Option<&str> = Some("cpuUtilization");
const LOAD: Option<&str> = Some("loadAverageMinute");
const MEMORY: Option<&str> = Some("memory");
const TASKS: Option<&str> = Some("tasks");
const SWAP: Option<&str> = Some("swap");

static ENHANCED: &[MetricDefinition] = &[
    field(None, "numVCPUs", "rds_enhanced_vcpus", "Number of virtual CPUs for the instance."),
    field(CPU, "guest", "rds_enhanced_cpu_guest_percent", "Percentage of CPU in use by guest programs."),
    field(CPU, "irq", "rds_enhanced_cpu_irq_percent", "Percentage of CPU in use by software interrupts."),
    field(CPU, "system", "rds_enhanced_cpu_system_percent", "Percentage of CPU in use by the kernel."),
    field(CPU, "wait", "rds_enhanced_cpu_wait_percent", "Percentage of CPU unused while waiting for I/O access."),
    field(CPU, "idle", "rds_enhanced_cpu_idle_percent", "Percentage of CPU that is idle."),
    field(CPU, "user", "rds_enhanced_cpu_user_percent", "Percentage of CPU in use by user programs."),
    field(CPU, "total", "rds_enhanced_cpu_total_percent", "Total percentage of the CPU in use."),
    field(CPU, "steal", "rds_enhanced_cpu_steal_percent", "Percentage of CPU in use by other virtual machines."),
    field(CPU, "nice", "rds_enhanced_cpu_nice_percent", "Percentage of CPU in use by programs running at lowest priority."),
    field(LOAD, "one", "rds_enhanced_load_average_1m", "Number of processes requesting CPU time over the last minute."),
    field(LOAD, "five", "rds_enhanced_load_average_5m", "Number of processes requesting CPU time over the last 5 minutes."),
    field(LOAD, "fifteen", "rds_enhanced_load_average_15m", "Number of processes requesting CPU time over the last 15 minutes."),
    field(MEMORY, "total", "rds_enhanced_memory_total_kilobytes", "Total amount of memory."),
    field(MEMORY, "free", "rds_enhanced_memory_free_kilobytes", "Amount of unassigned memory."),
    field(MEMORY, "cached", "rds_enhanced_memory_cached_kilobytes", "Amount of memory used for caching file system-based I/O."),
    field(MEMORY, "buffers", "rds_enhanced_memory_buffers_kilobytes", "Amount of memory used for buffering I/O requests."),
    field(MEMORY, "active", "rds_enhanced_memory_active_kilobytes", "Amount of assigned memory."),
    field(MEMORY, "inactive", "rds_enhanced_memory_inactive_kilobytes", "Amount of least-frequently used memory pages."),
    field(MEMORY, "dirty", "rds_enhanced_memory_dirty_kilobytes", "Amount of memory pages modified but not written to storage."),
    field(MEMORY, "writeback", "rds_enhanced_memory_writeback_kilobytes", "Amount of dirty pages still being written to storage."),
    field(MEMORY, "mapped", "rds_enhanced_memory_mapped_kilobytes", "Amount of file-system contents mapped into a process address space."),
    field(MEMORY, "slab", "rds_enhanced_memory_slab_kilobytes", "Amount of reusable kernel data structures."),
    field(TASKS, "running", "rds_enhanced_tasks_running", "Number of tasks that are running."),
    field(TASKS, "sleeping", "rds_enhanced_tasks_sleeping", "Number of tasks that are sleeping."),
    field(TASKS, "stopped", "rds_enhanced_tasks_stopped", "Number of tasks that are stopped."),
    field(TASKS, "zombie", "rds_enhanced_tasks_zombie", "Number of child tasks that are inactive with an active parent."),
    field(TASKS, "blocked", "rds_enhanced_tasks_blocked", "Number of tasks that are blocked."),
    field(TASKS, "total", "rds_enhanced_tasks_total", "Total number of tasks."),
    field(SWAP, "total", "rds_enhanced_swap_total_kilobytes", "Total amount of swap memory available."),
    field(SWAP, "free", "rds_enhanced_swap_free_kilobytes", "Amount of swap memory free."),
    field(SWAP, "cached", "rds_enhanced_swap_cached_kilobytes", "Amount of swap memory used as cache memory."),
    field(SWAP, "in", "rds_enhanced_swap_in_kilobytes_per_second", "Amount of memory swapped in from disk."),
    field(SWAP, "out", "rds_enhanced_swap_out_kilobytes_per_second", "Amount of memory swapped out to disk."),
    entry("network", "rx", NETWORK_LABELS, "rds_enhanced_network_rx_bytes_per_second", "Number of bytes received per second."),
    entry("network", "tx", NETWORK_LABELS, "rds_enhanced_network_tx_bytes_per_second", "Number of bytes uploaded per second."),
    entry("diskIO", "readIOsPS", DISK_LABELS, "rds_enhanced_disk_read_iops", "Number of read operations per second."),
    entry("diskIO", "writeIOsPS", DISK_LABELS, "rds_enhanced_disk_write_iops", "Number of write operations per second."),
    entry("diskIO", "readKbPS", DISK_LABELS, "rds_enhanced_disk_read_kilobytes_per_second", "Number of kilobytes read per second."),
    entry("diskIO", "writeKbPS", DISK_LABELS, "rds_enhanced_disk_write_kilobytes_per_second", "Number of kilobytes written per second."),
    entry("diskIO", "avgQueueLen", DISK_LABELS, "rds_enhanced_disk_average_queue_length", "Number of requests waiting in the I/O device queue."),
    entry("diskIO", "await", DISK_LABELS, "rds_enhanced_disk_await_milliseconds", "Number of milliseconds required to respond to requests."),
    entry("diskIO", "util", DISK_LABELS, "rds_enhanced_disk_utilization_percent", "Percentage of CPU time during which requests were issued."),
    entry("diskIO", "tps", DISK_LABELS, "rds_enhanced_disk_transfers_per_second", "Number of I/O transactions per second."),
    entry("fileSys", "total", FILESYSTEM_LABELS, "rds_enhanced_filesystem_total_kilobytes", "Total number of disk space available for the file system."),
    entry("fileSys", "used", FILESYSTEM_LABELS, "rds_enhanced_filesystem_used_kilobytes", "Amount of disk space used by files in the file system."),
    entry("fileSys", "usedPercent", FILESYSTEM_LABELS, "rds_enhanced_filesystem_used_percent", "Percentage of available disk space in use."),
    entry("fileSys", "maxFiles", FILESYSTEM_LABELS, "rds_enhanced_filesystem_max_files", "Maximum number of files that can be created for the file system."),
    entry("fileSys", "usedFiles", FILESYSTEM_LABELS, "rds_enhanced_filesystem_used_files", "Number of files in the file system."),
    entry("processList", "cpuUsedPc", PROCESS_LABELS, "rds_enhanced_process_cpu_used_percent", "Percentage of CPU used by the process."),
    entry("processList", "memoryUsedPc", PROCESS_LABELS, "rds_enhanced_process_memory_used_percent", "Percentage of total memory used by the process."),
    entry("processList", "rss", PROCESS_LABELS, "rds_enhanced_process_rss_kilobytes", "Amount of RAM allocated to the process."),
    entry("processList", "vss", PROCESS_LABELS, "rds_enhanced_process_vss_kilobytes", "Amount of virtual memory allocated to the process."),
];

/// Ordered definitions of one mode.
pub fn definitions(mode: Mode) -> &'static [MetricDefinition] {
    match mode {
        Mode::Basic => BASIC,
        Mode::Enhanced => ENHANCED,
    }
}

/// `instance` and `region` label pairs shared by every metric of an instance.
pub fn instance_labels(instance: &Instance) -> Vec<(&'static str, String)> {
    vec![
        (INSTANCE_LABEL, instance.instance.clone()),
        (REGION_LABEL, instance.region.clone()),
    ]
}
