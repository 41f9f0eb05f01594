//! Command dispatch: maps parsed arguments onto application services

use std::io;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::services::EditSession;
use crate::cli::args::{Cli, Commands, ConfigCommands, PropertyArgs};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_dir, global_config_path, local_config_path, Settings};
use crate::domain::{Configuration, NodeData, NodeDraft, Scalar, TreeDisplay, ValueType};
use crate::infrastructure::traits::{AssumeYes, Confirmer, SelectionItem, StdinConfirmer};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let project_dir = resolve_project_dir(cli.project_dir.as_deref())?;

    match &cli.command {
        Some(Commands::Config { command }) => return _config(command, &project_dir),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, name, &mut io::stdout());
            return Ok(());
        }
        None => return Ok(()),
        Some(_) => {}
    }

    let settings = Settings::load(Some(&project_dir))?;
    let container = ServiceContainer::new(settings)?;
    let file = resolve_file(cli.file.as_deref(), &container.settings, &project_dir);
    debug!("project_dir={} file={}", project_dir.display(), file.display());

    match &cli.command {
        Some(Commands::Compile { env }) => _compile(&container, &file, env.as_deref()),
        Some(Commands::Validate) => _validate(&container, &file),
        Some(Commands::Tree) => _tree(&container, &file),
        Some(Commands::Preview { path }) => _preview(&container, &file, path),
        Some(Commands::Keys { path }) => _keys(&container, &file, path),
        Some(Commands::Add {
            parent,
            key,
            property,
        }) => _add(&container, &file, parent, key.as_deref(), property),
        Some(Commands::Edit {
            path,
            key,
            property,
        }) => _edit(&container, &file, path, key.as_deref(), property),
        Some(Commands::Delete { path, yes }) => _delete(&container, &file, path, *yes),
        Some(Commands::List { dir }) => _list(&container, dir.as_deref().unwrap_or(&project_dir)),
        Some(Commands::Config { .. }) | Some(Commands::Completion { .. }) | None => Ok(()),
    }
}

fn resolve_project_dir(project_dir: Option<&Path>) -> CliResult<PathBuf> {
    match project_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir()
            .map_err(|e| InfraError::io("get current directory", e).into()),
    }
}

/// Explicit file argument, else the configured default relative to the project.
fn resolve_file(file: Option<&Path>, settings: &Settings, project_dir: &Path) -> PathBuf {
    let file = file.unwrap_or(&settings.default_file);
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        project_dir.join(file)
    }
}

fn load(container: &ServiceContainer, file: &Path) -> CliResult<Configuration> {
    Ok(container.config_service().load(file)?)
}

#[instrument(skip(container))]
fn _compile(container: &ServiceContainer, file: &Path, env: Option<&str>) -> CliResult<()> {
    let config = load(container, file)?;
    let environment = match env {
        Some(name) => name.to_string(),
        None => select_environment(container, &config)?,
    };
    let yaml = container
        .config_service()
        .compile(&environment, &config)
        .ok_or_else(|| CliError::Reported(format!("cannot compile '{}'", environment)))?;
    output::document(&yaml);
    Ok(())
}

fn select_environment(container: &ServiceContainer, config: &Configuration) -> CliResult<String> {
    let items: Vec<SelectionItem> = config
        .environment_names()
        .into_iter()
        .map(|name| SelectionItem {
            display: name.clone(),
            value: name,
        })
        .collect();
    if items.is_empty() {
        return Err(CliError::Usage("no environments defined".into()));
    }
    let selected = container
        .selector
        .select_one(&items, "environment> ")
        .map_err(|message| InfraError::Selector { message })?;
    selected
        .map(|item| item.value)
        .ok_or_else(|| CliError::Usage("no environment selected".into()))
}

#[instrument(skip(container))]
fn _validate(container: &ServiceContainer, file: &Path) -> CliResult<()> {
    let config = load(container, file)?;
    let service = container.config_service();
    if !service.validate(&config) {
        return Err(CliError::Reported(format!("{} is invalid", file.display())));
    }
    let failed: Vec<String> = config
        .environment_names()
        .into_iter()
        .filter(|env| service.compile(env, &config).is_none())
        .collect();
    if !failed.is_empty() {
        return Err(CliError::Reported(format!(
            "environments failed to compile: {}",
            failed.iter().join(", ")
        )));
    }
    output::success(&format!("{} is valid", file.display()));
    Ok(())
}

fn _tree(container: &ServiceContainer, file: &Path) -> CliResult<()> {
    let config = load(container, file)?;
    output::info(&config.default.to_tree_string());
    output::info(&config.environments.to_tree_string());
    Ok(())
}

fn _preview(container: &ServiceContainer, file: &Path, path: &str) -> CliResult<()> {
    let config = load(container, file)?;
    let node = config.resolve_path(path)?;
    let yaml = container
        .config_service()
        .preview(&config, node)
        .ok_or_else(|| CliError::Reported(format!("cannot preview '{}'", path)))?;
    output::document(&yaml);
    Ok(())
}

fn _keys(container: &ServiceContainer, file: &Path, path: &str) -> CliResult<()> {
    let config = load(container, file)?;
    let node = config.resolve_path(path)?;
    let mut session = container.edit_session(config);
    let property = session.compose(node, false)?;
    if property.key_options.is_empty() {
        output::detail(&"(free-form)");
    }
    for option in &property.key_options {
        output::info(&format!("{} ({})", option.key, option.value_type));
    }
    Ok(())
}

#[instrument(skip(container, property))]
fn _add(
    container: &ServiceContainer,
    file: &Path,
    parent: &str,
    key: Option<&str>,
    property: &PropertyArgs,
) -> CliResult<()> {
    let config = load(container, file)?;
    let node = config.resolve_path(parent)?;
    let is_array = config
        .tree(node.tree)
        .map(|tree| tree.is_array(node.index))
        .unwrap_or(false);
    let mut session = container.edit_session(config);

    let options = session.compose(node, false)?.key_options.clone();
    let key = match key {
        Some(key) => key.to_string(),
        None if is_array => String::new(),
        None => return Err(CliError::InvalidArgs("a key is required".into())),
    };
    let offered = if is_array {
        options.first().map(|option| option.value_type)
    } else {
        options
            .iter()
            .find(|option| option.key == key)
            .map(|option| option.value_type)
    };
    if !options.is_empty() && offered.is_none() && !is_array {
        let keys = options.iter().map(|o| o.key.as_str()).join(", ");
        return Err(CliError::InvalidArgs(format!(
            "'{}' is not available here, choose one of: {}",
            key, keys
        )));
    }

    let draft = build_draft(key, property, None, offered)?;
    let added = session.commit(draft)?;
    let label = session.configuration().path_string(added);
    save(container, file, session)?;
    output::success(&format!("added {}", label));
    Ok(())
}

#[instrument(skip(container, property))]
fn _edit(
    container: &ServiceContainer,
    file: &Path,
    path: &str,
    key: Option<&str>,
    property: &PropertyArgs,
) -> CliResult<()> {
    let config = load(container, file)?;
    let node = config.resolve_path(path)?;
    let current = config
        .data(node)
        .cloned()
        .ok_or_else(|| CliError::Usage(format!("node not found: {}", path)))?;
    let mut session = container.edit_session(config);

    session.compose(node, true)?;
    let key = key.map(str::to_string).unwrap_or_else(|| current.key.clone());
    let draft = build_draft(key, property, Some(&current), None)?;
    let edited = session.commit(draft)?;
    let label = session.configuration().path_string(edited);
    save(container, file, session)?;
    output::success(&format!("updated {}", label));
    Ok(())
}

#[instrument(skip(container))]
fn _delete(container: &ServiceContainer, file: &Path, path: &str, yes: bool) -> CliResult<()> {
    let config = load(container, file)?;
    let node = config.resolve_path(path)?;
    let mut session = container.edit_session(config);

    let confirmer: Box<dyn Confirmer> = if yes {
        Box::new(AssumeYes)
    } else {
        Box::new(StdinConfirmer)
    };
    if !session.delete(node, confirmer.as_ref())? {
        output::warning(&"aborted");
        return Ok(());
    }
    save(container, file, session)?;
    output::success(&format!("deleted {}", path));
    Ok(())
}

fn _list(container: &ServiceContainer, dir: &Path) -> CliResult<()> {
    let files = container.config_service().discover(dir)?;
    if files.is_empty() {
        output::warning(&format!("no configuration files below {}", dir.display()));
    }
    for path in files {
        output::info(&path.display());
    }
    Ok(())
}

fn save(container: &ServiceContainer, file: &Path, session: EditSession) -> CliResult<()> {
    let config = session.into_configuration();
    container
        .config_service()
        .save(file, &config)
        .map_err(|e| CliError::Reported(e.to_string()))
}

/// Candidate node from command line fields layered over `base`.
fn build_draft(
    key: String,
    args: &PropertyArgs,
    base: Option<&NodeData>,
    offered: Option<ValueType>,
) -> CliResult<NodeDraft> {
    let value_type = match &args.value_type {
        Some(name) => name.parse::<ValueType>()?,
        None => base
            .map(|data| data.value_type)
            .or(offered)
            .unwrap_or(if args.value.is_some() {
                ValueType::String
            } else {
                ValueType::Object
            }),
    };

    let mut data = base
        .cloned()
        .unwrap_or_else(|| NodeData::new(key.clone(), value_type));
    data.key = key;

    if let Some(text) = &args.value {
        data.value = Some(Scalar::parse(value_type, text)?);
    } else if data.value_type != value_type {
        // keep the old value when it still reads as the new type
        data.value = match (&data.value, value_type.is_scalar()) {
            (Some(old), true) => Scalar::parse(value_type, &old.to_string()).ok(),
            _ => None,
        };
    }
    data.value_type = value_type;

    if args.no_anchor {
        data.anchor = None;
    } else if let Some(anchor) = &args.anchor {
        data.anchor = Some(anchor.clone());
    }
    if args.no_aliases {
        data.aliases.clear();
    } else if !args.aliases.is_empty() {
        data.aliases = args.aliases.clone();
    }
    if let Some(comment) = &args.comment {
        data.comment = (!comment.is_empty()).then(|| comment.clone());
    }

    Ok(NodeDraft::new(data))
}

fn _config(command: &ConfigCommands, project_dir: &Path) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(Some(project_dir))?;
            output::document(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path()
                    .ok_or_else(|| CliError::Usage("cannot determine config directory".into()))?
            } else {
                local_config_path(project_dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| InfraError::io(format!("create {}", parent.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::success(&format!("created {}", path.display()));
            Ok(())
        }
        ConfigCommands::Path => {
            output::header(&"Config paths");
            match (global_config_dir(), global_config_path()) {
                (Some(_), Some(path)) => output::detail(&format!(
                    "global: {}{}",
                    path.display(),
                    exists_marker(&path)
                )),
                _ => output::detail(&"global: (unavailable)"),
            }
            let local = local_config_path(project_dir);
            output::detail(&format!("local:  {}{}", local.display(), exists_marker(&local)));
            Ok(())
        }
    }
}

fn exists_marker(path: &Path) -> &'static str {
    if path.exists() {
        " (exists)"
    } else {
        ""
    }
}
