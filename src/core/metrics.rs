use metrics_exporter_prometheus::PrometheusBuilder;

use crate::core::config::Settings;

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    PrometheusBuilder::new().install()?;
    Ok(())
}
