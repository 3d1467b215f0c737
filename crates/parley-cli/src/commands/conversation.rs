//! Conversation management commands.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};

use parley_core::error::format_error_with_suggestion;
use parley_core::{Conversation, Message, ProviderKind, Role};
use parley_session::{ConversationStore, ConversationSummary, TokenEstimator};

use crate::{AppContext, ConversationAction};

/// Format a datetime for display.
fn format_time(dt: &DateTime<Utc>) -> String {
    let local: DateTime<Local> = dt.with_timezone(&Local);
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// Format a conversation summary for display.
fn format_conversation_summary(c: &ConversationSummary) -> String {
    let title = c.title.as_deref().unwrap_or("(untitled)");
    format!(
        "{} {} [{} {}] {} ({} msgs, {} archived, {}/{} tokens)",
        c.id,
        title,
        c.provider,
        c.model,
        format_time(&c.updated_at),
        c.message_count,
        c.archived_count,
        c.current_token_count,
        c.context_window_size
    )
}

pub async fn handle(action: ConversationAction, ctx: &Arc<AppContext>) -> anyhow::Result<()> {
    let store = ctx.open_store()?;

    match action {
        ConversationAction::New {
            user,
            model,
            provider,
            window,
            title,
        } => {
            let provider = provider.unwrap_or_else(|| ctx.config.providers.default_provider.clone());
            let provider: ProviderKind = provider.parse()?;
            let mut conversation = Conversation::new(user, model, provider, window);
            if let Some(title) = title {
                conversation = conversation.with_title(title);
            }
            store.create_conversation(&conversation).await?;
            println!("{}", conversation.id);
        }
        ConversationAction::Add {
            id,
            user,
            role,
            content,
        } => {
            let estimator = TokenEstimator::new(ctx.config.compaction.chars_per_token);
            let message = add_message(&store, &estimator, &id, &user, &role, content).await?;
            println!("{} (#{})", message.id, message.sequence);

            let conversation = store.get_conversation(&id).await?;
            if let Err(e) = conversation.check_budget() {
                eprintln!("Warning: {}", format_error_with_suggestion(&e));
            }
        }
        ConversationAction::Show { id, user, archived } => {
            show_conversation(&store, &id, &user, archived).await?;
        }
        ConversationAction::List { user, limit } => {
            let conversations = store.list_conversations(&user, limit).await?;
            if conversations.is_empty() {
                println!("No conversations found.");
                return Ok(());
            }

            println!("Conversations ({}):", conversations.len());
            println!();
            for conversation in &conversations {
                println!("{}", format_conversation_summary(conversation));
            }
            println!();
            println!("Use 'parley conversation show <id> --user {}' for details", user);
        }
        ConversationAction::Delete { id, user } => {
            let conversation = owned(&store, &id, &user).await?;
            store.delete_conversation(&conversation.id).await?;
            println!("Deleted conversation {}", conversation.id);
        }
    }

    Ok(())
}

/// Load a conversation the user owns.
async fn owned<S: ConversationStore>(
    store: &S,
    id: &str,
    user: &str,
) -> anyhow::Result<Conversation> {
    match store.get_conversation(id).await {
        Ok(conversation) if conversation.is_owned_by(user) => Ok(conversation),
        Ok(_) => anyhow::bail!("Conversation not found: {}", id),
        Err(e) => Err(e.into()),
    }
}

/// Append a message to a conversation the user owns, with an estimated token count.
async fn add_message<S: ConversationStore>(
    store: &S,
    estimator: &TokenEstimator,
    id: &str,
    user: &str,
    role: &str,
    content: String,
) -> anyhow::Result<Message> {
    let role: Role = role.parse()?;
    owned(store, id, user).await?;
    let tokens = estimator.estimate(&content);
    let message = store
        .append_message(Message::new(id, role, content).with_token_count(tokens))
        .await?;
    Ok(message)
}

async fn show_conversation<S: ConversationStore>(
    store: &S,
    id: &str,
    user: &str,
    archived: bool,
) -> anyhow::Result<()> {
    let conversation = owned(store, id, user).await?;
    let messages = store.active_messages(id).await?;

    println!("Conversation: {}", conversation.id);
    if let Some(ref title) = conversation.title {
        println!("Title: {}", title);
    }
    println!("Model: {} ({})", conversation.model, conversation.provider);
    println!(
        "Tokens: {} / {} ({:.1}%)",
        conversation.current_token_count,
        conversation.context_window_size,
        conversation.usage_ratio(conversation.current_token_count) * 100.0
    );
    println!("Updated: {}", format_time(&conversation.updated_at));
    println!();

    for message in &messages {
        let marker = if message.is_summary { " [summary]" } else { "" };
        println!("#{} {}{}:", message.sequence, message.role, marker);
        println!("  {}", message.content.replace('\n', "\n  "));
    }

    if archived {
        let archives = store.archived_messages(id).await?;
        println!();
        println!("Archived ({}):", archives.len());
        for archive in &archives {
            println!(
                "#{} {} (summary {}): {}",
                archive.sequence,
                archive.role,
                archive.summary_message_id,
                archive.content
            );
        }
    }

    Ok(())
}
