//! Integration setup and teardown
//!
//! Each integration builds its device facade from the runtime context,
//! initializes it, and wraps it in the coordinator shared by its entities.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::config::RuntimeContext;
use crate::entity::{self, Entity};
use crate::nest::{HttpNestClient, NestCoordinator, NestWebDevice};
use crate::refresh::RefreshSettings;
use crate::rpi::{RaspberryPiDevice, RpiCoordinator};

pub fn setup_rpi(ctx: &RuntimeContext) -> Result<Arc<RpiCoordinator>> {
    log::info!("Beginning rpi_sensor setup");
    let mut device = RaspberryPiDevice::new(ctx.net_loc().map(str::to_string), ctx.timeout());
    if !device.initialize() {
        bail!(
            "Raspberry Pi sensor setup failed.\n\
            Set rpi_sensor.net_loc in the config file, --net-loc or RPI_NET_LOC."
        );
    }

    let coordinator = Arc::new(RpiCoordinator::new(device, ctx.rpi_settings()));
    log::info!("Completed rpi_sensor setup for {}", coordinator.fetcher().host());
    Ok(coordinator)
}

/// Build the Nest coordinator and load its first snapshot
pub async fn setup_nest(ctx: &RuntimeContext) -> Result<Arc<NestCoordinator>> {
    log::info!("Beginning nest setup");
    let Some(base_url) = ctx.nest_url() else {
        bail!(
            "No Nest gateway configured.\n\
            Set nest.base_url in the config file, --nest-url or NEST_URL."
        );
    };

    let client = HttpNestClient::new(
        base_url,
        ctx.nest_token().map(str::to_string),
        ctx.timeout(),
        ctx.insecure(),
    )
    .context("creating Nest client")?;

    let mut device = NestWebDevice::new(Arc::new(client), ctx.config.nest.structure.clone());
    if !device.initialize().await {
        bail!("Nest setup failed: unable to reach {base_url}");
    }

    let coordinator = start_nest(device, ctx.nest_settings(), base_url).await?;
    log::info!("Completed nest setup");
    Ok(coordinator)
}

/// Wrap an initialized device in its coordinator and load the first snapshot
async fn start_nest(
    device: NestWebDevice,
    settings: RefreshSettings,
    source: &str,
) -> Result<Arc<NestCoordinator>> {
    let coordinator = Arc::new(NestCoordinator::new(device, settings));
    coordinator.refresh().await;
    if coordinator.latest_data().is_none() {
        bail!("Nest setup failed: no thermostat data from {source}");
    }
    Ok(coordinator)
}

/// Every integration enabled in the configuration
#[derive(Default)]
pub struct Integrations {
    pub rpi: Option<Arc<RpiCoordinator>>,
    pub nest: Option<Arc<NestCoordinator>>,
}

impl Integrations {
    /// Set up the integrations that have their address configured.
    ///
    /// A failing integration is logged and skipped; it is an error only when
    /// nothing could be set up.
    pub async fn setup(ctx: &RuntimeContext) -> Result<Self> {
        let mut integrations = Self::default();

        if ctx.net_loc().is_some() {
            match setup_rpi(ctx) {
                Ok(coordinator) => integrations.rpi = Some(coordinator),
                Err(err) => log::error!("{err:#}"),
            }
        }
        if ctx.nest_url().is_some() {
            match setup_nest(ctx).await {
                Ok(coordinator) => integrations.nest = Some(coordinator),
                Err(err) => log::error!("{err:#}"),
            }
        }

        if integrations.rpi.is_none() && integrations.nest.is_none() {
            bail!(
                "No integration could be set up.\n\
                Configure rpi_sensor.net_loc and/or nest.base_url."
            );
        }
        Ok(integrations)
    }

    pub fn entities(&self) -> Vec<Box<dyn Entity>> {
        let mut entities = Vec::new();
        if let Some(rpi) = &self.rpi {
            entities.extend(entity::rpi_entities(rpi));
        }
        if let Some(nest) = &self.nest {
            entities.extend(entity::nest_entities(nest));
        }
        entities
    }

    pub fn teardown(&self) {
        if let Some(rpi) = &self.rpi {
            rpi.fetcher().aclose();
        }
        log::debug!("Integrations torn down");
    }
}
