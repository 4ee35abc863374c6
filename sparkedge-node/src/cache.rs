use std::collections::HashMap;
use std::sync::Mutex;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sparkedge_types::{utils, Metric, MetricValue};

use crate::error::PublishError;

/// Point-in-time copy of metric values only, used for change detection.
/// Comparison is by value equality, never by timestamp.
#[derive(Debug, Default)]
struct Snapshot {
    node: HashMap<String, MetricValue>,
    devices: HashMap<String, HashMap<String, MetricValue>>,
}

/// The metrics whose values differ from the previous snapshot.
#[derive(Debug, Default)]
pub(crate) struct ChangeSet {
    pub node: Vec<Metric>,
    /// Devices with an empty change list are omitted.
    pub devices: Vec<(String, Vec<Metric>)>,
}

/// Last-known state of every node-level and device-level metric.
///
/// The live maps are concurrent; producers upserting disjoint metrics never
/// block each other. Snapshot compare-and-replace is the one serialized
/// section, kept short by copying values out of the live maps inside it.
pub(crate) struct MetricCache {
    node: DashMap<String, Metric>,
    devices: DashMap<String, DashMap<String, Metric>>,
    snapshot: Mutex<Option<Snapshot>>,
}

fn upsert_into(scope: &DashMap<String, Metric>, metric: Metric) -> Result<(), PublishError> {
    match scope.entry(metric.name().to_string()) {
        Entry::Occupied(mut entry) => {
            let value = metric.value().clone();
            entry.get_mut().update(value, metric.timestamp())?;
        }
        Entry::Vacant(entry) => {
            entry.insert(metric);
        }
    }
    Ok(())
}

pub(crate) fn validate_device_id(device_id: &str) -> Result<(), PublishError> {
    utils::validate_name(device_id)
        .map_err(|e| PublishError::InvalidArgument(format!("device id: {e}")))
}

impl MetricCache {
    pub fn new() -> Self {
        Self {
            node: DashMap::new(),
            devices: DashMap::new(),
            snapshot: Mutex::new(None),
        }
    }

    /// Insert a node metric, or overwrite the stored record's value and
    /// timestamp in place if one of that name exists.
    pub fn upsert_node(&self, metric: Metric) -> Result<(), PublishError> {
        upsert_into(&self.node, metric)
    }

    /// Insert or overwrite a device metric, creating the device scope if
    /// this is the first write for the device id.
    pub fn upsert_device(&self, device_id: &str, metric: Metric) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        let scope = self
            .devices
            .entry(device_id.to_string())
            .or_default();
        upsert_into(&scope, metric)
    }

    /// Insert or overwrite a device metric only if the device scope already
    /// exists. Never creates the scope; the check and the write happen under
    /// the same map guard, so a concurrent scope removal cannot interleave
    /// between them.
    pub fn upsert_device_if_present(
        &self,
        device_id: &str,
        metric: Metric,
    ) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        match self.devices.get(device_id) {
            Some(scope) => upsert_into(&scope, metric),
            None => Err(PublishError::DeviceNotBorn(device_id.to_string())),
        }
    }

    /// Create an empty device scope if none exists. Used by device birth so
    /// a device with no metrics still counts as born.
    pub fn ensure_device(&self, device_id: &str) -> Result<(), PublishError> {
        validate_device_id(device_id)?;
        self.devices.entry(device_id.to_string()).or_default();
        Ok(())
    }

    pub fn get_node(&self, name: &str) -> Option<Metric> {
        self.node.get(name).map(|entry| entry.value().clone())
    }

    pub fn get_device(&self, device_id: &str, name: &str) -> Option<Metric> {
        self.devices
            .get(device_id)?
            .get(name)
            .map(|entry| entry.value().clone())
    }

    pub fn has_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Consistent list of all current node metrics.
    pub fn all_node(&self) -> Vec<Metric> {
        self.node.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Consistent list of all current metrics for one device. An unknown
    /// device id yields an empty list, not an error.
    pub fn all_device(&self, device_id: &str) -> Vec<Metric> {
        match self.devices.get(device_id) {
            Some(scope) => scope.iter().map(|entry| entry.value().clone()).collect(),
            None => Vec::new(),
        }
    }

    /// Every known device id with its current metrics.
    pub fn all_devices(&self) -> Vec<(String, Vec<Metric>)> {
        self.devices
            .iter()
            .map(|scope| {
                let metrics = scope
                    .value()
                    .iter()
                    .map(|entry| entry.value().clone())
                    .collect();
                (scope.key().clone(), metrics)
            })
            .collect()
    }

    /// Atomically drop a device scope and all of its metrics. Idempotent;
    /// returns whether the device existed.
    pub fn remove_device(&self, device_id: &str) -> bool {
        self.devices.remove(device_id).is_some()
    }

    /// Diff current values against the previous snapshot and replace it.
    ///
    /// With no prior snapshot every current metric is reported as changed; a
    /// device absent from the prior snapshot contributes all of its metrics.
    /// Two consecutive calls with no intervening writes return an empty
    /// change set on the second call.
    pub fn compute_changes(&self) -> ChangeSet {
        let mut guard = self.snapshot.lock().unwrap();
        let prior = guard.take();
        let mut next = Snapshot::default();
        let mut changes = ChangeSet::default();

        for entry in self.node.iter() {
            let metric = entry.value();
            let changed = match &prior {
                None => true,
                Some(snapshot) => snapshot.node.get(metric.name()) != Some(metric.value()),
            };
            if changed {
                changes.node.push(metric.clone());
            }
            next.node
                .insert(metric.name().to_string(), metric.value().clone());
        }

        for scope in self.devices.iter() {
            let device_id = scope.key();
            let prior_scope = prior
                .as_ref()
                .and_then(|snapshot| snapshot.devices.get(device_id));
            let mut device_changes = Vec::new();
            let mut next_scope = HashMap::new();
            for entry in scope.value().iter() {
                let metric = entry.value();
                let changed = match prior_scope {
                    None => true,
                    Some(values) => values.get(metric.name()) != Some(metric.value()),
                };
                if changed {
                    device_changes.push(metric.clone());
                }
                next_scope.insert(metric.name().to_string(), metric.value().clone());
            }
            next.devices.insert(device_id.clone(), next_scope);
            if !device_changes.is_empty() {
                changes.devices.push((device_id.clone(), device_changes));
            }
        }

        *guard = Some(next);
        changes
    }

    /// Discard the stored snapshot so the next [compute_changes] reports
    /// every current metric as changed. Used to force a full republish.
    pub fn reset_change_tracking(&self) {
        let mut guard = self.snapshot.lock().unwrap();
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(name: &str, value: f64) -> Metric {
        Metric::new(name, value).unwrap()
    }

    fn node_change_names(changes: &ChangeSet) -> Vec<String> {
        let mut names: Vec<String> =
            changes.node.iter().map(|m| m.name().to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn upsert_then_get_returns_latest_value() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        cache.upsert_node(metric("Temperature", 23.1)).unwrap();
        let stored = cache.get_node("Temperature").unwrap();
        assert_eq!(*stored.value(), MetricValue::Double(23.1));
    }

    #[test]
    fn upsert_keeps_timestamp_non_decreasing() {
        let cache = MetricCache::new();
        cache
            .upsert_node(metric("Temperature", 22.5).with_timestamp(2000))
            .unwrap();
        cache
            .upsert_node(metric("Temperature", 23.1).with_timestamp(1000))
            .unwrap();
        let stored = cache.get_node("Temperature").unwrap();
        assert_eq!(stored.timestamp(), 2000);
        assert_eq!(*stored.value(), MetricValue::Double(23.1));
    }

    #[test]
    fn blank_device_id_rejected() {
        let cache = MetricCache::new();
        assert!(matches!(
            cache.upsert_device("", metric("Voltage", 230.0)),
            Err(PublishError::InvalidArgument(_))
        ));
        assert!(matches!(
            cache.upsert_device("   ", metric("Voltage", 230.0)),
            Err(PublishError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_device_yields_empty_list() {
        let cache = MetricCache::new();
        assert!(cache.all_device("nope").is_empty());
        assert!(cache.get_device("nope", "Voltage").is_none());
    }

    #[test]
    fn remove_device_drops_all_metrics() {
        let cache = MetricCache::new();
        cache
            .upsert_device("Motor1", metric("Voltage", 230.0))
            .unwrap();
        cache
            .upsert_device("Motor1", metric("Current", 2.0))
            .unwrap();

        assert!(cache.remove_device("Motor1"));
        assert!(cache.all_device("Motor1").is_empty());
        assert!(cache.get_device("Motor1", "Voltage").is_none());
        /* idempotent */
        assert!(!cache.remove_device("Motor1"));
    }

    #[test]
    fn upsert_if_present_never_creates_a_scope() {
        let cache = MetricCache::new();
        assert!(matches!(
            cache.upsert_device_if_present("Motor1", metric("Voltage", 230.0)),
            Err(PublishError::DeviceNotBorn(_))
        ));
        assert!(!cache.has_device("Motor1"));

        cache
            .upsert_device("Motor1", metric("Voltage", 230.0))
            .unwrap();
        cache
            .upsert_device_if_present("Motor1", metric("Voltage", 231.0))
            .unwrap();
        let stored = cache.get_device("Motor1", "Voltage").unwrap();
        assert_eq!(*stored.value(), MetricValue::Double(231.0));

        /* a removed scope stays removed */
        cache.remove_device("Motor1");
        assert!(matches!(
            cache.upsert_device_if_present("Motor1", metric("Voltage", 232.0)),
            Err(PublishError::DeviceNotBorn(_))
        ));
        assert!(!cache.has_device("Motor1"));
    }

    #[test]
    fn first_compute_changes_reports_everything() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        cache
            .upsert_device("Motor1", metric("Voltage", 230.0))
            .unwrap();

        let changes = cache.compute_changes();
        assert_eq!(node_change_names(&changes), vec!["Temperature"]);
        assert_eq!(changes.devices.len(), 1);
        assert_eq!(changes.devices[0].0, "Motor1");
        assert_eq!(changes.devices[0].1.len(), 1);
    }

    #[test]
    fn second_compute_changes_without_writes_is_empty() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        cache
            .upsert_device("Motor1", metric("Voltage", 230.0))
            .unwrap();

        cache.compute_changes();
        let changes = cache.compute_changes();
        assert!(changes.node.is_empty());
        assert!(changes.devices.is_empty());
    }

    #[test]
    fn same_value_upsert_is_not_a_change() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();

        let changes = cache.compute_changes();
        assert_eq!(node_change_names(&changes), vec!["Temperature"]);
        assert_eq!(*changes.node[0].value(), MetricValue::Double(22.5));

        /* rewrite with the same value; timestamp moves but the value does not */
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        let changes = cache.compute_changes();
        assert!(changes.node.is_empty());

        cache.upsert_node(metric("Temperature", 23.1)).unwrap();
        let changes = cache.compute_changes();
        assert_eq!(node_change_names(&changes), vec!["Temperature"]);
        assert_eq!(*changes.node[0].value(), MetricValue::Double(23.1));
    }

    #[test]
    fn device_absent_from_prior_snapshot_contributes_everything() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        cache.compute_changes();

        cache
            .upsert_device("Motor1", metric("Voltage", 230.0))
            .unwrap();
        let changes = cache.compute_changes();
        assert!(changes.node.is_empty());
        assert_eq!(changes.devices.len(), 1);
        assert_eq!(changes.devices[0].0, "Motor1");
    }

    #[test]
    fn reset_change_tracking_forces_full_republish() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        cache.compute_changes();

        cache.reset_change_tracking();
        let changes = cache.compute_changes();
        assert_eq!(node_change_names(&changes), vec!["Temperature"]);
    }

    #[test]
    fn upsert_with_conflicting_shape_rejected() {
        let cache = MetricCache::new();
        cache.upsert_node(metric("Temperature", 22.5)).unwrap();
        let boolean = Metric::new("Temperature", true).unwrap();
        assert!(matches!(
            cache.upsert_node(boolean),
            Err(PublishError::InvalidArgument(_))
        ));
    }

    #[test]
    fn concurrent_upserts_from_multiple_threads() {
        use std::sync::Arc;

        let cache = Arc::new(MetricCache::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u32 {
                    let m = Metric::new(format!("m{t}"), i).unwrap();
                    cache.upsert_node(m).unwrap();
                    let d = Metric::new("Voltage", f64::from(i)).unwrap();
                    cache.upsert_device(&format!("dev{t}"), d).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.all_node().len(), 4);
        assert_eq!(cache.all_devices().len(), 4);
        for t in 0..4 {
            let stored = cache.get_node(&format!("m{t}")).unwrap();
            assert_eq!(*stored.value(), MetricValue::UInt32(99));
        }
    }
}
