use clap::{Arg, ArgAction, Command};
use lead_funnel::form::{FormBinding, FormOptions, MapForm};
use lead_funnel::lead::PageContext;
use lead_funnel::normalization::{known_operators, normalize_operator};
use lead_funnel::submitter::LeadSubmitter;
use lead_funnel::Config;
use log::LevelFilter;
use std::collections::HashMap;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("lead-funnel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Submit website leads to the backend, falling back to the email relay")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/lead-funnel.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("normalize-operator")
                .long("normalize-operator")
                .value_name("NAME")
                .help("Print the canonical id for an operator name and exit")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("list-operators")
                .long("list-operators")
                .help("List known canonical operator ids and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("form")
                .long("form")
                .value_name("FILE")
                .help("JSON or YAML file with the submitted form fields")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("field")
                .short('f')
                .long("field")
                .value_name("KEY=VALUE")
                .help("Form field, repeatable (e.g. -f nome='Ana Silva')")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("page-url")
                .long("page-url")
                .value_name("URL")
                .help("Page the form was submitted from (UTM tags are read from it)")
                .default_value(""),
        )
        .arg(
            Arg::new("user-agent")
                .long("user-agent")
                .value_name("UA")
                .help("Client user agent to record with the lead")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("operadora")
                .long("operadora")
                .value_name("NAME")
                .help("Force the operator, overriding the form field")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Override the lead subject")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    if let Some(name) = matches.get_one::<String>("normalize-operator") {
        println!("{}", normalize_operator(name));
        return;
    }

    if matches.get_flag("list-operators") {
        for id in known_operators() {
            println!("{id}");
        }
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/lead-funnel.yaml");

    let config = match Config::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("❌ Configuration validation failed: {e:#}");
        process::exit(1);
    }

    if matches.get_flag("test-config") {
        println!("✅ Configuration is valid");
        println!("  Mode: {:?}", config.mode);
        println!(
            "  Rate limit: {} submissions per {}s",
            config.rate_limit.max_attempts, config.rate_limit.window_seconds
        );
        println!("  Relay recipient: {}", config.relay.recipient);
        return;
    }

    let mut fields = match matches.get_one::<String>("form") {
        Some(path) => match load_form_file(path) {
            Ok(fields) => fields,
            Err(e) => {
                eprintln!("Error reading form file: {e:#}");
                process::exit(1);
            }
        },
        None => HashMap::new(),
    };
    if let Some(pairs) = matches.get_many::<String>("field") {
        for pair in pairs {
            match pair.split_once('=') {
                Some((key, value)) => {
                    fields.insert(key.trim().to_string(), value.to_string());
                }
                None => {
                    eprintln!("Ignoring malformed --field {pair:?} (expected KEY=VALUE)");
                }
            }
        }
    }

    if fields.is_empty() {
        eprintln!("Nothing to submit: pass --form FILE or one or more --field KEY=VALUE");
        process::exit(1);
    }

    let submitter = match LeadSubmitter::from_config(&config) {
        Ok(submitter) => Arc::new(submitter),
        Err(e) => {
            eprintln!("Error setting up delivery: {e:#}");
            process::exit(1);
        }
    };

    let options = FormOptions {
        operadora: matches.get_one::<String>("operadora").cloned(),
        subject: matches.get_one::<String>("subject").cloned(),
        ..FormOptions::default()
    };
    let binding = FormBinding::new(submitter, options);

    let page_url = matches
        .get_one::<String>("page-url")
        .cloned()
        .unwrap_or_default();
    let user_agent = matches
        .get_one::<String>("user-agent")
        .cloned()
        .unwrap_or_else(|| format!("lead-funnel/{}", env!("CARGO_PKG_VERSION")));
    let page = PageContext::new(page_url).with_user_agent(user_agent);

    let mut form = MapForm::new(fields);
    let result = binding.submit(&mut form, &page).await;

    for alert in &form.alerts {
        println!("{alert}");
    }
    match serde_json::to_string_pretty(&result) {
        Ok(json) => log::debug!("Submission result:\n{json}"),
        Err(e) => log::warn!("Could not render result: {e}"),
    }

    if !result.is_success() {
        process::exit(1);
    }
}

fn load_form_file(path: &str) -> anyhow::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    let fields = if path.ends_with(".json") {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(fields)
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!(
                "Set backend.api_key (or LEAD_FUNNEL_API_KEY) and the relay addresses before use."
            );
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}
