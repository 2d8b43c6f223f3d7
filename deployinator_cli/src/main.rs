#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
#[macro_use]
extern crate error_chain;

use clap::{Arg, ArgAction, ArgMatches, Command};
use deployinator::{compose, server, Context, Error, Result, ResultExt, SecretKind, Settings};
use std::{path::PathBuf, process};

fn print_error_debug(e: &Error) {
    // unwind the error chain
    for e in e.iter().skip(1) {
        warn!("caused by: {}", e);
    }
}

fn build_cli() -> Command {
    let files = Arg::new("files")
        .required(true)
        .num_args(1..)
        .value_parser(clap::value_parser!(PathBuf))
        .help("Config files, highest priority first");
    let kind = Arg::new("kind")
        .required(true)
        .value_parser(["env", "files", "certs"])
        .help("Which secret of the service");

    Command::new("deployinator")
        .version(crate_version!())
        .about(crate_description!())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Increase verbosity"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Adds line numbers to log statements"),
        )
        .subcommand(Command::new("serve").about("Start the http server"))
        .subcommand(
            Command::new("compose")
                .about("Compose config files and print the result")
                .arg(files.clone()),
        )
        .subcommand(
            Command::new("validate")
                .about("Compose config files and validate the result")
                .arg(files),
        )
        .subcommand(
            Command::new("secret")
                .about("Manage versioned service secrets")
                .subcommand_required(true)
                .subcommand(
                    Command::new("versions")
                        .about("List prior versions of a secret, newest first")
                        .arg(Arg::new("secret").required(true)),
                )
                .subcommand(
                    Command::new("revert")
                        .about("Restore a secret to one of its versions")
                        .arg(Arg::new("secret").required(true))
                        .arg(Arg::new("version").required(true)),
                )
                .subcommand(
                    Command::new("set")
                        .about("Set a key in a service secret")
                        .arg(Arg::new("service").required(true))
                        .arg(kind.clone())
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                )
                .subcommand(
                    Command::new("unset")
                        .about("Remove a key from a service secret")
                        .arg(Arg::new("service").required(true))
                        .arg(kind)
                        .arg(Arg::new("key").required(true)),
                ),
        )
        .subcommand(
            Command::new("vault")
                .about("Query vault")
                .subcommand_required(true)
                .subcommand(Command::new("health").about("Show vault health")),
        )
}

#[actix_web::main]
async fn main() {
    let args = build_cli().get_matches();
    let name = args.subcommand_name().unwrap_or_default().to_string();
    if let Err(e) = run(&args).await {
        error!("{} error: {}", name, e);
        print_error_debug(&e);
        process::exit(1);
    }
}

async fn run(args: &ArgMatches) -> Result<()> {
    // always show INFO messages
    loggerv::Logger::new()
        .verbosity(u64::from(args.get_count("verbose")) + 1)
        .module_path(true)
        .line_numbers(args.get_flag("debug"))
        .init()
        .chain_err(|| "could not initialise logging")?;
    dispatch_commands(args).await
}

fn arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    match args.get_one::<String>(name) {
        Some(v) => Ok(v),
        None => bail!("missing argument {}", name),
    }
}

fn files(args: &ArgMatches) -> Vec<PathBuf> {
    args.get_many::<PathBuf>("files").into_iter().flatten().cloned().collect()
}

async fn dispatch_commands(args: &ArgMatches) -> Result<()> {
    let settings = Settings::from_env()?;
    match args.subcommand() {
        Some(("serve", _)) => server::run(settings.listen_addr).await,
        Some(("compose", a)) => {
            let config = compose::compose_files(&files(a))?;
            print!("{}", compose::to_yaml(&config)?);
            Ok(())
        }
        Some(("validate", a)) => {
            compose::validate_files(&files(a))?;
            Ok(())
        }
        Some(("secret", a)) => {
            let ctx = Context::new(settings).connect_kube().await?;
            secret_commands(&ctx, a).await
        }
        Some(("vault", a)) => {
            let ctx = Context::new(settings).connect_vault()?;
            vault_commands(&ctx, a).await
        }
        _ => bail!("unknown subcommand"),
    }
}

async fn secret_commands(ctx: &Context, args: &ArgMatches) -> Result<()> {
    let secrets = ctx.secrets()?;
    match args.subcommand() {
        Some(("versions", a)) => {
            for v in secrets.service_secret_versions(arg(a, "secret")?).await? {
                let name = v.metadata.name.unwrap_or_default();
                let created = v
                    .metadata
                    .creation_timestamp
                    .map(|t| serde_json::to_string(&t))
                    .transpose()?
                    .unwrap_or_default();
                println!("{}\t{}", name, created.trim_matches('"'));
            }
            Ok(())
        }
        Some(("revert", a)) => {
            secrets
                .revert_service_secret(arg(a, "secret")?, arg(a, "version")?)
                .await
        }
        Some(("set", a)) => {
            let project = ctx.settings.project_name()?;
            let kind: SecretKind = arg(a, "kind")?.parse()?;
            let changed = secrets
                .set_service_secret_key(project, arg(a, "service")?, kind, arg(a, "key")?, arg(a, "value")?.as_bytes())
                .await?;
            if !changed {
                info!("Secret unchanged");
            }
            Ok(())
        }
        Some(("unset", a)) => {
            let project = ctx.settings.project_name()?;
            let kind: SecretKind = arg(a, "kind")?.parse()?;
            let changed = secrets
                .delete_service_secret_key(project, arg(a, "service")?, kind, arg(a, "key")?)
                .await?;
            if !changed {
                info!("Key not present");
            }
            Ok(())
        }
        _ => bail!("unknown secret subcommand"),
    }
}

async fn vault_commands(ctx: &Context, args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("health", _)) => {
            let health = ctx.vault()?.health().await?;
            println!(
                "initialized: {}\nsealed: {}\nstandby: {}\nversion: {}",
                health.initialized, health.sealed, health.standby, health.version
            );
            Ok(())
        }
        _ => bail!("unknown vault subcommand"),
    }
}
