//! Compaction, restoration and recount commands.
//!
//! Each command prints its report as JSON on stdout.

use std::sync::Arc;

use serde::Serialize;

use crate::AppContext;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn compress(
    ctx: &Arc<AppContext>,
    id: &str,
    user: &str,
    keep_recent: Option<usize>,
) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let report = ctx.engine().compact(&store, id, user, keep_recent).await?;
    print_json(&report)
}

pub async fn restore(ctx: &Arc<AppContext>, id: &str, user: &str) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let report = ctx.engine().restore(&store, id, user).await?;
    print_json(&report)
}

pub async fn recount(ctx: &Arc<AppContext>, id: &str, user: &str) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let report = ctx.engine().recount(&store, id, user).await?;
    print_json(&report)
}
