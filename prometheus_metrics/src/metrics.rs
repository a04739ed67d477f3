use anyhow::Result;
use log::warn;
use prometheus::{
    histogram_opts, opts, Histogram, HistogramVec, IntCounter, IntGauge, IntGaugeVec, Registry,
};
use types::phase0::primitives::{Epoch, Slot};

#[derive(Debug)]
pub struct Metrics {
    // Collection Lengths
    collection_lengths: IntGaugeVec,

    // Fork choice tasks
    pub fc_task_times: HistogramVec,

    pub block_processing_times: Histogram,
    pub block_batch_processing_times: Histogram,
    pub block_transition_times: Histogram,

    // EF interop metrics
    beacon_current_justified_epoch: IntGauge,
    beacon_finalized_epoch: IntGauge,
    beacon_head_slot: IntGauge,

    pub beacon_reorgs_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            // Collection Lengths
            collection_lengths: IntGaugeVec::new(
                opts!("COLLECTION_LENGTHS", "Number of items in each collection"),
                &["type", "name"],
            )?,

            // Fork choice tasks
            fc_task_times: HistogramVec::new(
                histogram_opts!("FC_TASK_TIMES", "Fork choice task times"),
                &["task"],
            )?,

            block_processing_times: Histogram::with_opts(histogram_opts!(
                "CONTROLLER_BLOCK_PROCESSING_TIMES",
                "Controller block processing times",
            ))?,

            block_batch_processing_times: Histogram::with_opts(histogram_opts!(
                "CONTROLLER_BLOCK_BATCH_PROCESSING_TIMES",
                "Controller block batch processing times",
            ))?,

            block_transition_times: Histogram::with_opts(histogram_opts!(
                "BLOCK_TRANSITION_TIMES",
                "Block transition times",
            ))?,

            // EF interop metrics
            beacon_current_justified_epoch: IntGauge::new(
                "beacon_current_justified_epoch",
                "Justified epoch at head",
            )?,

            beacon_finalized_epoch: IntGauge::new(
                "beacon_finalized_epoch",
                "Finalized epoch at head",
            )?,

            beacon_head_slot: IntGauge::new("beacon_head_slot", "Head slot")?,

            beacon_reorgs_total: IntCounter::new("beacon_reorgs_total", "Total number of reorgs")?,
        })
    }

    pub fn register_with_default_metrics(&self) -> Result<()> {
        self.register(prometheus::default_registry())
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.collection_lengths.clone()))?;
        registry.register(Box::new(self.fc_task_times.clone()))?;
        registry.register(Box::new(self.block_processing_times.clone()))?;
        registry.register(Box::new(self.block_batch_processing_times.clone()))?;
        registry.register(Box::new(self.block_transition_times.clone()))?;
        registry.register(Box::new(self.beacon_current_justified_epoch.clone()))?;
        registry.register(Box::new(self.beacon_finalized_epoch.clone()))?;
        registry.register(Box::new(self.beacon_head_slot.clone()))?;
        registry.register(Box::new(self.beacon_reorgs_total.clone()))?;

        Ok(())
    }

    // Collection Lengths
    pub fn set_collection_length(&self, typename: &str, collection_name: &str, value: usize) {
        match self
            .collection_lengths
            .get_metric_with_label_values(&[typename, collection_name])
        {
            Ok(metric) => metric.set(value.try_into().unwrap_or(i64::MAX)),
            Err(error) => warn!(
                "unable to set collection length for {typename}::{collection_name}: {error:?}",
            ),
        }
    }

    // EF interop metrics
    pub fn set_justified_epoch(&self, epoch: Epoch) {
        self.beacon_current_justified_epoch
            .set(epoch.try_into().unwrap_or(i64::MAX));
    }

    pub fn set_finalized_epoch(&self, epoch: Epoch) {
        self.beacon_finalized_epoch
            .set(epoch.try_into().unwrap_or(i64::MAX));
    }

    pub fn set_head_slot(&self, slot: Slot) {
        self.beacon_head_slot.set(slot.try_into().unwrap_or(i64::MAX));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_can_be_registered_once_per_registry() -> Result<()> {
        let metrics = Metrics::new()?;
        let registry = Registry::new();

        metrics.register(&registry)?;

        assert!(metrics.register(&registry).is_err());

        Ok(())
    }

    #[test]
    fn gauges_report_the_latest_value() -> Result<()> {
        let metrics = Metrics::new()?;

        metrics.set_head_slot(5);
        metrics.set_head_slot(7);
        metrics.set_finalized_epoch(2);
        metrics.set_collection_length("AttestationPool", "unaggregated", 3);

        assert_eq!(metrics.beacon_head_slot.get(), 7);
        assert_eq!(metrics.beacon_finalized_epoch.get(), 2);
        assert_eq!(
            metrics
                .collection_lengths
                .get_metric_with_label_values(&["AttestationPool", "unaggregated"])?
                .get(),
            3,
        );

        Ok(())
    }
}
