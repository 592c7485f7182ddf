/// LiveBuffer Demo
///
/// Drives a grid view over an in-memory backend: loads the first window,
/// scrolls, edits a row, reorders one by drag and drop, and logs what the
/// buffer looks like after each step. Set RUST_LOG=debug to see the fetch
/// planning and reconciliation decisions.

use livebuffer::*;
use std::sync::Arc;

const TITLE: FieldId = 1;
const STATE: FieldId = 2;

fn fields() -> Vec<Field> {
    vec![
        Field::new(TITLE, "title", FieldType::Text),
        Field::new(
            STATE,
            "state",
            FieldType::SingleSelect {
                options: vec![SelectOption::new(1, "Backlog"), SelectOption::new(2, "Shipped")],
            },
        ),
    ]
}

fn describe(grid: &GridViewController) -> String {
    grid.ids()
        .iter()
        .take(24)
        .map(|id| id.map(|id| id.to_string()).unwrap_or_else(|| ".".to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let count: u64 = std::env::var("ROWS")
        .ok()
        .and_then(|rows| rows.parse().ok())
        .unwrap_or(500);
    let config = match std::env::var("LIVEBUFFER_CONFIG") {
        Ok(json) => BufferConfig::from_json(&json)?,
        Err(_) => BufferConfig::default()
            .with_request_size(8)
            .with_initial_window(VisibleRange::new(0, 3)),
    };
    config.validate()?;

    let rows = (1..=count)
        .map(|i| {
            Row::new(i, i as f64)
                .with_value(TITLE, FieldValue::Text(format!("Task {}", i)))
                .with_value(STATE, FieldValue::SelectOption(1 + i % 2))
        })
        .collect();
    let transport = Arc::new(MemoryTransport::with_rows(fields(), rows));
    let view = ViewDefinition {
        group_by: vec![STATE],
        ..ViewDefinition::default()
    };
    let grid = GridViewController::new(transport.clone(), config, fields(), view);

    grid.refresh().await?;
    log::info!("loaded {} rows: {}", grid.get_count(), describe(&grid));

    grid.on_visible_range_changed(12, 15).await?;
    log::info!("after scrolling: {}", describe(&grid));

    if let Some((_, row)) = grid.find_row(2) {
        grid.update_row_value(&row, STATE, FieldValue::SelectOption(2)).await?;
        let shipped = grid.aggregates().count(0, &[GroupValue::Option(2)]).unwrap_or(0);
        log::info!("row 2 shipped, {} rows shipped in total", shipped);
    }

    grid.start_drag(4)?;
    grid.force_move_row_to(0)?;
    let decision = grid.stop_drag().await?;
    log::info!("drag finished with {:?}: {}", decision, describe(&grid));

    let created = transport.insert_row(RowValues::new());
    let outcome = grid.apply_remote(RowMutation::Created(created));
    log::info!(
        "remote create {:?} at {:?}, count is now {}",
        outcome.membership,
        outcome.location,
        grid.get_count()
    );

    for change in grid.drain_changes() {
        log::debug!("change: {:?}", change);
    }
    Ok(())
}
