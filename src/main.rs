use anyhow::{Context, bail};
use clap::{Arg, ArgMatches, Command, value_parser};
use promptbench::config::Config;
use promptbench::recorder::InvocationRecorder;
use promptbench::service::ModelService;
use promptbench::session::Session;
use promptbench::state::FileStateStore;
use promptbench::template::parse_messages;
use promptbench::tree::Draft;
use promptbench::types::{ChatMessage, RequestOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("promptbench")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Versioned prompt workbench for a local Ollama server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("models").about("List models on the backend"))
        .subcommand(
            Command::new("invoke")
                .about("Add a version from a user prompt and run it")
                .arg(Arg::new("model").required(true).help("Model to run"))
                .arg(
                    Arg::new("prompt")
                        .required(true)
                        .num_args(1..)
                        .trailing_var_arg(true)
                        .help("Prompt text; words are joined with spaces"),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Add a version from a Llama-3 transcript and run it")
                .arg(Arg::new("model").required(true).help("Model to run"))
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Transcript with header tokens"),
                ),
        )
        .subcommand(Command::new("history").about("Show saved versions"))
        .subcommand(Command::new("extract").about("Keep only flagged versions"))
        .subcommand(Command::new("reset").about("Delete the saved session"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing();

    let matches = cli().get_matches();

    let store = FileStateStore::new(config.state_path.clone());
    let mut session = Session::new();
    session.load(&store).context("failed to load session state")?;

    let service = Arc::new(ModelService::from_config(&config));

    match matches.subcommand() {
        Some(("models", _)) => {
            for model in service.list_models().await? {
                println!("{model}");
            }
        }
        Some(("invoke", args)) => {
            let model = required(args, "model")?;
            let prompt: Vec<&str> = args
                .get_many::<String>("prompt")
                .unwrap_or_default()
                .map(String::as_str)
                .collect();
            let messages = vec![ChatMessage::user(prompt.join(" "))];
            let draft = Draft::new(model, messages, RequestOptions::default());
            run(&service, session, &store, draft).await?;
        }
        Some(("import", args)) => {
            let model = required(args, "model")?;
            let file = args
                .get_one::<PathBuf>("file")
                .context("missing argument file")?;
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let messages = parse_messages(&text);
            let draft = Draft::new(model, messages, RequestOptions::default());
            run(&service, session, &store, draft).await?;
        }
        Some(("history", _)) => {
            let tree = session.tree();
            for node in tree.forest().iter() {
                let marker = if tree.selected() == Some(node.id) { "*" } else { " " };
                let flag = if node.flagged { "F" } else { " " };
                println!(
                    "{marker}{flag} {:>4}  {}  {}  ({} runs)",
                    node.id.0,
                    node.title,
                    node.model,
                    node.invoke_history.len()
                );
            }
        }
        Some(("extract", _)) => {
            let kept = session.tree_mut().extract_flagged_nodes().len();
            session.save(&store)?;
            println!("kept {kept} flagged versions");
        }
        Some(("reset", _)) => {
            session.delete(&store)?;
        }
        Some((other, _)) => bail!("unknown command {other}"),
        None => bail!("no command given"),
    }

    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> anyhow::Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument {name}"))
}

async fn run(
    service: &Arc<ModelService>,
    mut session: Session,
    store: &FileStateStore,
    draft: Draft,
) -> anyhow::Result<()> {
    session.tree_mut().add_node(draft)?;

    service.start();
    let session = Mutex::new(session);
    let result = InvocationRecorder::new(service.clone())
        .invoke_selected(&session)
        .await;
    service.stop().await;

    session.lock().await.save(store)?;

    let response = result?;
    if response.is_timeout() {
        eprintln!("model did not answer before the deadline");
    } else {
        println!("{}", response.content);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn invoke_collects_every_prompt_word() {
        let matches = cli()
            .try_get_matches_from(["promptbench", "invoke", "llama3", "why", "is", "the", "sky", "blue"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "invoke");
        assert_eq!(required(args, "model").unwrap(), "llama3");
        let prompt: Vec<&String> = args.get_many::<String>("prompt").unwrap().collect();
        assert_eq!(prompt.len(), 5);
    }

    #[test]
    fn import_takes_a_model_and_a_path() {
        let matches = cli()
            .try_get_matches_from(["promptbench", "import", "llama3", "chat.txt"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<PathBuf>("file"), Some(&PathBuf::from("chat.txt")));
    }

    #[test]
    fn rejects_missing_or_unknown_commands() {
        assert!(cli().try_get_matches_from(["promptbench"]).is_err());
        assert!(cli().try_get_matches_from(["promptbench", "invoke", "llama3"]).is_err());
        assert!(cli().try_get_matches_from(["promptbench", "frobnicate"]).is_err());
        assert!(cli().try_get_matches_from(["promptbench", "history"]).is_ok());
    }
}
