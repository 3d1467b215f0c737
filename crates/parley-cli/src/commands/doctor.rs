//! `parley doctor`: report what compaction will be able to use.

use std::sync::Arc;

use parley_core::{config::IssueSeverity, Config, ProviderKind};
use parley_providers::LocalProvider;
use parley_session::SqliteConversationStore;

use crate::AppContext;

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "✗"
    }
}

pub async fn run(ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    check_config(&ctx.config);
    check_storage(&ctx.config);
    check_backends(ctx);
    check_ollama(ctx).await;
    Ok(())
}

fn check_config(config: &Config) {
    let dir = Config::config_dir();
    println!("[config] {}", dir.display());
    if !dir.exists() {
        println!("  - no user config, built-in defaults apply");
    }

    let validation = config.validate();
    if validation.issues.is_empty() {
        println!("  {} settings valid", mark(true));
    }
    for issue in &validation.issues {
        let symbol = match issue.severity {
            IssueSeverity::Error => mark(false),
            IssueSeverity::Warning => "!",
        };
        println!("  {} {}: {}", symbol, issue.field, issue.message);
    }
    println!(
        "  keep_recent={} max_summary_messages={} chars_per_token={}",
        config.compaction.keep_recent,
        config.compaction.max_summary_messages,
        config.compaction.chars_per_token
    );
}

fn check_storage(config: &Config) {
    println!("\n[storage] {}", config.data_dir().display());
    match SqliteConversationStore::open(config) {
        Ok(store) => println!("  {} {}", mark(true), store.path().display()),
        Err(e) => println!("  {} cannot open database: {}", mark(false), e),
    }
}

fn check_backends(ctx: &AppContext) {
    println!("\n[backends] default: {}", ctx.config.providers.default_provider);
    let engine = ctx.engine();
    for kind in [ProviderKind::Local, ProviderKind::Hosted] {
        match ctx.registry.get(kind) {
            Some(chat) if engine.backends().contains(kind) => println!(
                "  {} {} via {} ({})",
                mark(chat.is_configured()),
                kind,
                chat.name(),
                if kind == ProviderKind::Local {
                    "exact token counts"
                } else {
                    "estimated token counts"
                }
            ),
            _ => println!(
                "  {} {} unavailable, compaction falls back to a plain summary",
                mark(false),
                kind
            ),
        }
    }
    if ctx.registry.get(ProviderKind::Hosted).is_none() {
        let hint = match std::env::var("OPENAI_API_KEY") {
            Ok(_) => "OPENAI_API_KEY is set but the hosted backend did not register",
            Err(_) => "set OPENAI_API_KEY to enable the hosted backend",
        };
        println!("    {}", hint);
    }
}

async fn check_ollama(ctx: &AppContext) {
    if ctx.registry.get(ProviderKind::Local).is_none() {
        return;
    }
    let ollama = ctx
        .config
        .providers
        .local
        .as_ref()
        .and_then(|c| c.base_url.clone())
        .or_else(|| std::env::var("OLLAMA_HOST").ok())
        .map(LocalProvider::with_url)
        .unwrap_or_default();

    println!("\n[ollama] {}", ollama.base_url());
    if !ollama.is_running().await {
        println!("  {} not reachable", mark(false));
        return;
    }
    match ollama.list_models().await {
        Ok(models) if models.is_empty() => println!("  ! running, no models pulled"),
        Ok(models) => {
            println!("  {} running, {} model(s)", mark(true), models.len());
            for model in &models {
                println!("    {} ({} MB)", model.name, model.size / (1024 * 1024));
            }
        }
        Err(e) => println!("  {} {}", mark(false), e),
    }
}
