//! Demo and inspection tool for the interaction-model engine.
//!
//! Usage:
//!   cargo run -- events --count 60
//!   cargo run -- events --persist
//!   cargo run -- write --items 8 --per-chunk 3

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use matter_im_engine::config::{Config, default_counter_dir, load_dotenv};
use matter_im_engine::error::Result;
use matter_im_engine::matter::access::AllowAll;
use matter_im_engine::matter::data_model::{
    AttributeMetadata, AttributeValue, InMemoryDataModel,
};
use matter_im_engine::matter::events::data::generic_switch_events;
use matter_im_engine::matter::events::{
    ConcreteEventPath, EventDataIB, EventManagement, EventOptions, EventPath, EventPriority,
    FetchCursor, UrgentEventNotifier,
};
use matter_im_engine::matter::exchange::{MessageType, RecordingExchange};
use matter_im_engine::matter::groups::GroupTable;
use matter_im_engine::matter::tlv::{TLVElement, TLVTag, TLVWrite, TlvBuf};
use matter_im_engine::matter::types::{Privilege, SubjectDescriptor};
use matter_im_engine::matter::write::messages::{decode_status_response, decode_write_response};
use matter_im_engine::matter::write::{
    ActiveWrites, AttributePathIB, ConcreteAttributePath, WriteHandler, WriteRequestBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Binding cluster on endpoint 1, the list written by the write demo
const BINDING: ConcreteAttributePath = ConcreteAttributePath {
    endpoint_id: 1,
    cluster_id: 0x001E,
    attribute_id: 0x0000,
};

#[derive(Parser)]
#[command(name = "matter-im-engine")]
#[command(about = "Matter interaction-model event log and write handler demo")]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "MATTER_IM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a burst of GenericSwitch events and show what the tiers kept
    Events {
        /// Number of events to log
        #[arg(long, default_value_t = 40)]
        count: u32,

        /// Persist the event number counter under the home directory
        #[arg(long)]
        persist: bool,
    },
    /// Run a chunked list write against the in-memory data model
    Write {
        /// Number of list items to write
        #[arg(long, default_value_t = 6)]
        items: u8,

        /// List items per WriteRequest chunk
        #[arg(long, default_value_t = 2)]
        per_chunk: usize,
    },
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    load_dotenv();
    init_logger();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config.with_env_overrides(),
            Err(e) => {
                error!("Failed to load configuration from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Config::from_env(),
    };

    let result = match cli.command {
        Commands::Events { count, persist } => run_events(config, count, persist).await,
        Commands::Write { items, per_chunk } => run_write(config, items, per_chunk),
    };
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run_events(config: Config, count: u32, persist: bool) -> Result<()> {
    let mut log_config = config.event_log;
    if persist && log_config.counter_dir.is_none() {
        log_config.counter_dir = Some(default_counter_dir());
    }
    info!("Event log configuration:");
    for tier in &log_config.tiers {
        info!("  {:?} tier: {} bytes", tier.priority, tier.capacity);
    }
    if let Some(dir) = &log_config.counter_dir {
        info!("  Event counter persisted in {}", dir.display());
    }

    let notifier = Arc::new(UrgentEventNotifier::new());
    let events = EventManagement::from_config(&log_config)?.with_scheduler(notifier.clone());

    let waiter = {
        let notifier = notifier.clone();
        tokio::spawn(async move {
            notifier.wait().await;
            notifier.take_pending().len()
        })
    };

    for i in 0..count {
        let (priority, event_id) = match i % 5 {
            0 => (EventPriority::Critical, generic_switch_events::LONG_PRESS),
            1 | 2 => (EventPriority::Info, generic_switch_events::SHORT_RELEASE),
            _ => (EventPriority::Debug, generic_switch_events::INITIAL_PRESS),
        };
        let path = ConcreteEventPath::new(1, generic_switch_events::CLUSTER_ID, event_id);
        let mut options = EventOptions::new(path, priority);
        if priority == EventPriority::Critical {
            options = options.urgent();
        }
        // NewPosition / PreviousPosition
        let position = (i % 4) as u8;
        let logged = events.log_event(
            &|w: &mut TlvBuf| -> Result<()> {
                w.u8(&TLVTag::Context(0), position)?;
                Ok(())
            },
            options,
        )?;
        if let Some(number) = logged {
            info!("Logged {:?} event #{}", priority, number);
        }
    }

    match tokio::time::timeout(Duration::from_millis(100), waiter).await {
        Ok(Ok(paths)) => info!("Urgent delivery scheduled for {} path(s)", paths),
        _ => info!("No urgent delivery scheduled"),
    }

    info!("Tier occupancy:");
    for tier in 0..events.tier_count() {
        info!(
            "  tier {}: {} events, {} bytes",
            tier,
            events.event_count(tier).unwrap_or(0),
            events.bytes_in_use(tier).unwrap_or(0)
        );
    }

    for priority in [EventPriority::Debug, EventPriority::Info, EventPriority::Critical] {
        let mut writer = TlvBuf::unbounded();
        writer.start_array(&TLVTag::Anonymous)?;
        let mut cursor = FetchCursor::default();
        let filters = [EventPath::wildcard()];
        events.fetch_events_since(&mut writer, &filters, priority, &mut cursor, None)?;
        writer.end_container()?;

        let mut numbers = Vec::new();
        for report in TLVElement::new(writer.as_slice()).array()?.iter() {
            numbers.push(EventDataIB::from_report(&report?)?.event_number);
        }
        info!(
            "{:?}: {} stored (first #{}, last #{}): {:?}",
            priority,
            cursor.event_count,
            events.first_event_number(priority),
            events.last_event_number(priority),
            numbers
        );
    }

    events.shutdown();
    Ok(())
}

fn run_write(config: Config, items: u8, per_chunk: usize) -> Result<()> {
    let model = Arc::new(InMemoryDataModel::new());
    model.add_attribute(
        BINDING,
        AttributeMetadata::writable(Privilege::Manage).list(),
        AttributeValue::empty_list(),
    );

    let mut handler =
        WriteHandler::new(Arc::new(AllowAll), Arc::new(GroupTable::new()), config.write);
    handler.init(model.clone(), Arc::new(ActiveWrites::new()))?;

    let exchange = RecordingExchange::unicast(1, SubjectDescriptor::case(1, 0x0001_B669));
    let outbox = exchange.outbox();
    let mut exchange = Some(Box::new(exchange));

    let values: Vec<u8> = (1..=items).collect();
    let per_chunk = per_chunk.max(1);
    let chunks: Vec<&[u8]> = if values.is_empty() {
        vec![&values[..]]
    } else {
        values.chunks(per_chunk).collect()
    };
    let path =
        AttributePathIB::concrete(BINDING.endpoint_id, BINDING.cluster_id, BINDING.attribute_id);

    for (index, chunk) in chunks.iter().enumerate() {
        let mut request = WriteRequestBuilder::new(false, false)?;
        if index == 0 {
            request = request.attribute(path, None, |w, tag| {
                w.start_array(tag)?;
                w.end_container()
            })?;
        }
        for value in chunk.iter() {
            request = request.attribute(path.append_item(), None, |w, tag| w.u8(tag, *value))?;
        }
        let more_chunks = index + 1 < chunks.len();
        let payload = request.finish(more_chunks)?;

        let status = match exchange.take() {
            Some(exchange) => handler.on_write_request(exchange, &payload, false)?,
            None => handler.on_message_received(1, MessageType::WriteRequest, &payload)?,
        };
        info!("Chunk {} of {}: {:?}", index + 1, chunks.len(), status);
        if !status.is_success() {
            warn!("Write transaction ended early");
            break;
        }
    }

    for message in outbox.lock().iter() {
        match message.message_type {
            MessageType::WriteResponse => {
                let statuses: Vec<_> = decode_write_response(&message.payload)?
                    .iter()
                    .map(|s| s.status.status)
                    .collect();
                info!("WriteResponse: {:?}", statuses);
            }
            _ => info!("StatusResponse: {:?}", decode_status_response(&message.payload)?),
        }
    }
    for (path, operation) in model.list_notifications() {
        info!("List notification {}: {:?}", path, operation);
    }
    if let Some(value) = model.value(&BINDING) {
        info!("Final value of {}: {}", BINDING, serde_json::to_string(&value)?);
    }
    Ok(())
}
