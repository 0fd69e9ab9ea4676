//! Entities command implementation

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use crate::config::RuntimeContext;
use crate::entity::{update_all, EntityState};
use crate::integration::Integrations;
use crate::output::{cell, output_for_format, print_table};

#[derive(Debug, Tabled, Serialize)]
struct EntityRow {
    entity_id: String,
    state: String,
    unique_id: String,
}

impl From<&EntityState> for EntityRow {
    fn from(state: &EntityState) -> Self {
        Self {
            entity_id: state.entity_id.clone(),
            state: cell(state.state.as_deref()),
            unique_id: state.unique_id.clone(),
        }
    }
}

pub async fn run(ctx: &RuntimeContext, filter: Option<String>) -> Result<()> {
    let integrations = Integrations::setup(ctx).await?;
    let mut entities = integrations.entities();
    update_all(&mut entities).await;
    integrations.teardown();

    let states: Vec<EntityState> = entities
        .iter()
        .map(|entity| entity.state())
        .filter(|state| matches_filter(state, filter.as_deref()))
        .collect();

    output_for_format(ctx, &states, || {
        if states.is_empty() {
            if filter.is_some() {
                println!("No entities found matching filter");
            } else {
                println!("No entities found");
            }
            return Ok(());
        }
        let rows: Vec<EntityRow> = states.iter().map(EntityRow::from).collect();
        print_table(ctx, &rows)
    })
}

fn matches_filter(state: &EntityState, filter: Option<&str>) -> bool {
    filter.map_or(true, |filter| {
        state
            .entity_id
            .to_lowercase()
            .contains(&filter.to_lowercase())
    })
}
