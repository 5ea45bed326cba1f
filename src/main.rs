use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};

use schema_stream::cli::{Cli, Command, IndexArgs, ParseArgs, ValidateArgs, VerbosityLevel};
use schema_stream::config::{Config, ConfigManager};
use schema_stream::{
    BatchValidator, CancellationSignal, ErrorReporter, FileDiscovery, Output, ParseRequest,
    RawElement, SchemaSet, StreamingParser, TypeDescriptor,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(2);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            let verbosity = if cli.quiet {
                VerbosityLevel::Quiet
            } else {
                VerbosityLevel::Normal
            };
            ErrorReporter::new(verbosity).report_config_error(&e);
            return ExitCode::from(2);
        }
    };

    match run(&cli, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            ErrorReporter::new(config.verbosity()).report_error(e.as_ref());
            ExitCode::from(2)
        }
    }
}

/// Run the selected command; `Ok(false)` means the input had errors
async fn run(cli: &Cli, config: &Config) -> Result<bool> {
    let schemas = SchemaSet::from_paths(cli.schema_paths())
        .await
        .context("Failed to load schemas")?;
    let output = Output::new(config.verbosity(), config.output.format);

    match &cli.command {
        Command::Validate(args) => validate(args, schemas, config, &output).await,
        Command::Parse(args) => parse(args, schemas, config, &output).await,
        Command::Index(args) => index(args, &schemas, &output),
    }
}

async fn validate(
    args: &ValidateArgs,
    schemas: SchemaSet,
    config: &Config,
    output: &Output,
) -> Result<bool> {
    let discovery = FileDiscovery::new()
        .with_extensions(config.files.extensions.clone())
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?
        .with_max_depth(config.files.max_depth)
        .with_follow_symlinks(config.files.follow_symlinks);

    let progress = config.validation.show_progress.then(|| {
        let reporter = ErrorReporter::new(config.verbosity());
        Arc::new(move |progress: schema_stream::ValidationProgress| {
            if progress.phase == schema_stream::ValidationPhase::Validation {
                reporter.report_progress(
                    progress.completed,
                    progress.total,
                    progress.current_file.as_deref(),
                );
            }
        }) as schema_stream::ProgressCallback
    });

    let validator = BatchValidator::new(
        schemas,
        ConfigManager::engine_config(config),
        ConfigManager::batch_config(config),
    );
    let summary = validator
        .validate_path(&args.path, &discovery, progress)
        .await?;

    print!("{}", output.format_batch(&summary));
    Ok(!summary.has_errors())
}

async fn parse(
    args: &ParseArgs,
    schemas: SchemaSet,
    config: &Config,
    output: &Output,
) -> Result<bool> {
    let mut parser = StreamingParser::with_config(ConfigManager::engine_config(config));

    if args.show_records {
        parser.on_node_read(|event| async move {
            if let Some(raw) = event.node_as::<RawElement>() {
                println!("{}", raw.xml);
            }
        });
    }

    if config.verbosity() >= VerbosityLevel::Verbose {
        let reporter = Arc::new(ErrorReporter::new(config.verbosity()));
        parser.on_error(move |error| {
            let reporter = Arc::clone(&reporter);
            async move { reporter.report_validation_error(&error) }
        });
    }

    let signal = CancellationSignal::new();
    {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel();
            }
        });
    }

    let mut request = ParseRequest::new()
        .records(args.records.iter().map(TypeDescriptor::raw))
        .report_errors(config.engine.report_errors)
        .cancellation(signal);
    if let Some(header) = &args.header {
        request = request.header(TypeDescriptor::raw(header));
    }

    let result = parser.parse_file(&args.file, &schemas, request).await;

    print!(
        "{}",
        output.format_run(&args.file.display().to_string(), &result)
    );
    Ok(result.is_valid())
}

fn index(args: &IndexArgs, schemas: &SchemaSet, output: &Output) -> Result<bool> {
    let index = schemas.tag_index();
    if let Some(type_name) = &args.type_name
        && index.tags_for(type_name).is_none()
    {
        bail!("Type {} is not bound to any element of the schema set", type_name);
    }
    print!("{}", output.format_index(&index, args.type_name.as_deref()));
    Ok(true)
}
