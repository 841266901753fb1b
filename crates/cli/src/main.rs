use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sickbay_core::aggregation;
use sickbay_core::codec::{self, IncidentMetadata};
use sickbay_core::model::{NotificationBatch, Priority};
use sickbay_core::responses;
use sickbay_core::{export, CampaignDesk, CoreConfig, IncidentDesk, JsonFileStore, RemoteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sickbay")]
#[command(about = "School health operations CLI")]
struct Cli {
    /// Data directory (defaults to SICKBAY_DATA_DIR, then "sickbay_data")
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack incident display fields into a notes string
    Encode {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// low, medium or high
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        contact_status: Option<String>,
    },
    /// Unpack a notes string, applying the usual fallbacks
    Decode {
        notes: String,
        /// Used as the title when the notes carry none
        #[arg(long)]
        description: Option<String>,
        /// Overrides whatever contact status the notes carry
        #[arg(long)]
        contact_status: Option<String>,
    },
    /// Incident dashboard counts
    Tally,
    /// Campaign participation rollups
    Rollup {
        /// Only this campaign
        campaign_id: Option<String>,
    },
    /// Response statistics for a notification batch file (YAML or JSON)
    Responses {
        file: PathBuf,
        /// Also list the responses matching this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Write the incident list as CSV
    Export {
        /// Output path (defaults to the dated filename in the current directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sickbay=info".parse()?)
                .add_directive("sickbay_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Encode {
            title,
            location,
            priority,
            contact_status,
        }) => {
            let priority = match priority {
                Some(raw) => Some(
                    Priority::parse(&raw)
                        .with_context(|| format!("unknown priority '{raw}'"))?,
                ),
                None => None,
            };
            println!(
                "{}",
                codec::encode(&IncidentMetadata {
                    title,
                    location,
                    priority,
                    contact_status,
                })
            );
        }
        Some(Commands::Decode {
            notes,
            description,
            contact_status,
        }) => {
            let decoded = codec::decode(
                Some(notes.as_str()),
                description.as_deref(),
                contact_status.as_deref(),
            );
            println!("Title: {}", decoded.title);
            println!("Location: {}", decoded.location);
            println!("Priority: {}", decoded.priority);
            println!("Contact Status: {}", decoded.contact_status);
        }
        Some(Commands::Tally) => {
            let desk = incident_desk(cli.data_dir)?;
            println!("{}", serde_json::to_string_pretty(&desk.tally())?);
        }
        Some(Commands::Rollup { campaign_id }) => {
            let desk = CampaignDesk::new(open_store(cli.data_dir)?);
            let summaries = desk.summaries()?;
            let summaries: Vec<_> = match campaign_id {
                Some(id) => {
                    let found: Vec<_> = summaries.into_iter().filter(|s| s.id == id).collect();
                    if found.is_empty() {
                        anyhow::bail!("campaign not found: {id}");
                    }
                    found
                }
                None => summaries,
            };
            if summaries.is_empty() {
                println!("No campaigns found.");
            }
            for summary in summaries {
                println!(
                    "{} ({}): {}/{} completed ({}), {} pending, {} contraindicated",
                    summary.title,
                    summary.id,
                    summary.rollup.completed,
                    summary.rollup.total_students,
                    summary.rollup.completion_pct,
                    summary.rollup.pending,
                    summary.rollup.contraindicated
                );
                for class in summary.classes {
                    println!(
                        "  {}: {}/{} ({}), {} with issues",
                        class.class_name,
                        class.rollup.completed,
                        class.rollup.total_students,
                        class.rollup.completion_pct,
                        class.with_issues
                    );
                }
            }
        }
        Some(Commands::Responses { file, search }) => {
            let batch = load_batch(&file)?;
            let tally = responses::tally_responses(&batch.responses);
            println!("{}", batch.title);
            println!("  Agreed: {}", tally.agreed);
            println!("  Declined: {}", tally.declined);
            println!("  No response: {}", tally.no_response);
            println!("  Response rate: {}", tally.response_rate_pct);

            let channel = responses::tally_channel_effectiveness(
                batch.channel,
                batch.total_recipients,
                batch.answered(),
            );
            println!(
                "  Channel {:?}: {}/{} ({})",
                channel.channel, channel.responded, channel.sent, channel.rate_pct
            );

            if let Some(needle) = search {
                for response in search_batch(&batch, &needle) {
                    println!(
                        "  {} ({}) / {}: {:?}",
                        response.student_name,
                        response.class_name,
                        response.parent_name,
                        response.response
                    );
                }
            }
        }
        Some(Commands::Export { output }) => {
            let desk = incident_desk(cli.data_dir)?;
            let rows = desk.snapshot();
            let path = output
                .unwrap_or_else(|| PathBuf::from(export::export_filename(Utc::now().date_naive())));
            std::fs::write(&path, export::incidents_csv(&rows))
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} incidents to {}", rows.len(), path.display());
        }
        None => {
            println!("Use 'sickbay --help' for commands");
        }
    }

    Ok(())
}

fn open_store(data_dir: Option<PathBuf>) -> anyhow::Result<Arc<dyn RemoteStore>> {
    let cfg = CoreConfig::from_env_values(
        data_dir
            .map(|p| p.display().to_string())
            .or_else(|| std::env::var("SICKBAY_DATA_DIR").ok()),
        None,
    )?;
    cfg.ensure_data_dir()?;
    Ok(Arc::new(JsonFileStore::new(cfg.data_dir())))
}

fn incident_desk(data_dir: Option<PathBuf>) -> anyhow::Result<IncidentDesk> {
    let desk = IncidentDesk::new(open_store(data_dir)?);
    let loaded = desk.refresh()?;
    tracing::info!("loaded {} incidents", loaded);
    Ok(desk)
}

/// Reads a notification batch file; `.json` files are parsed as JSON, anything else as YAML.
fn load_batch(path: &Path) -> anyhow::Result<NotificationBatch> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    tracing::debug!("parsing notification batch {}", path.display());
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    parse_batch(&text, is_json)
}

fn parse_batch(text: &str, is_json: bool) -> anyhow::Result<NotificationBatch> {
    let parsed = if is_json {
        let mut deserializer = serde_json::Deserializer::from_str(text);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
            let path = err.path().to_string();
            (path, err.into_inner().to_string())
        })
    } else {
        let deserializer = serde_yaml::Deserializer::from_str(text);
        serde_path_to_error::deserialize(deserializer).map_err(|err| {
            let path = err.path().to_string();
            (path, err.into_inner().to_string())
        })
    };

    parsed.map_err(|(path, source)| {
        let path = if path.is_empty() || path == "." {
            "<root>".to_string()
        } else {
            path
        };
        tracing::warn!("notification batch rejected at {}", path);
        anyhow::anyhow!("notification batch schema mismatch at {path}: {source}")
    })
}

fn search_batch<'a>(
    batch: &'a NotificationBatch,
    needle: &str,
) -> Vec<&'a sickbay_core::model::RecipientResponse> {
    aggregation::search(&batch.responses, needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sickbay_core::model::ResponseStatus;
    use tempfile::TempDir;

    const YAML_BATCH: &str = r#"
id: n1
title: Flu vaccine consent
target: Grade 2
status: Sent
channel: Email
total_recipients: 3
responses:
  - student_name: An
    class_name: 2A
    parent_name: Mrs Lan
    response: Agreed
  - student_name: Binh
    class_name: 2A
    parent_name: Mr Hai
    response: Declined
"#;

    #[test]
    fn parses_yaml_batch() {
        let batch = parse_batch(YAML_BATCH, false).unwrap();
        assert_eq!(batch.responses.len(), 2);
        assert_eq!(batch.responses[1].response, ResponseStatus::Declined);
        assert_eq!(batch.answered(), 2);
    }

    #[test]
    fn schema_errors_name_the_failing_path() {
        let broken = YAML_BATCH.replace("response: Declined", "response: Maybe");
        let err = parse_batch(&broken, false).unwrap_err().to_string();
        assert!(err.contains("responses[1].response"), "{err}");
    }

    #[test]
    fn json_files_are_detected_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"{"id":"n2","title":"Eye check","target":"All","total_recipients":1,"responses":[]}"#,
        )
        .unwrap();
        let batch = load_batch(&path).unwrap();
        assert_eq!(batch.id, "n2");
        assert!(batch.responses.is_empty());
    }

    #[test]
    fn missing_batch_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = load_batch(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn search_finds_parents_by_name() {
        let batch = parse_batch(YAML_BATCH, false).unwrap();
        assert_eq!(search_batch(&batch, "lan").len(), 1);
    }

    #[test]
    fn cli_parses_encode_flags() {
        let cli = Cli::try_parse_from([
            "sickbay",
            "encode",
            "--title",
            "Fall",
            "--priority",
            "high",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Encode { title: Some(_), priority: Some(_), .. })
        ));
    }
}
