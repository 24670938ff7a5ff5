//! Generate a shader from a template file.
//!
//! Usage:
//!   shadergen-generate <template> [--module <file>]... [--feature <NAME>]...
//!                      [--config <file.json>] [--name <shader name>]
//!                      [--out <file>] [--json]
//!
//! Module names are the file stems of the `--module` files. Without `--out`
//! the source goes to stdout; diagnostics always go to stderr unless
//! `--json` is given, in which case one JSON object is printed instead.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use shadergen::{GeneratorConfig, ModuleLibrary, ShaderGenerator};

#[derive(Debug, Default)]
struct Args {
    template: PathBuf,
    modules: Vec<PathBuf>,
    features: Vec<String>,
    config: Option<PathBuf>,
    name: Option<String>,
    out: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut template = None;
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--module" | "-m" => args.modules.push(value(&arg)?.into()),
            "--feature" | "-f" => args.features.push(value(&arg)?),
            "--config" | "-c" => args.config = Some(value(&arg)?.into()),
            "--name" | "-n" => args.name = Some(value(&arg)?),
            "--out" | "-o" => args.out = Some(value(&arg)?.into()),
            "--json" => args.json = true,
            flag if flag.starts_with('-') => bail!("Unknown option {flag}"),
            path => {
                if template.replace(PathBuf::from(path)).is_some() {
                    bail!("Only one template can be generated at a time");
                }
            }
        }
    }

    args.template = template.context("Missing template path")?;
    Ok(args)
}

fn load_modules(paths: &[PathBuf]) -> Result<ModuleLibrary> {
    let mut library = ModuleLibrary::new();
    for path in paths {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Invalid module file name {}", path.display()))?;
        let source = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        library
            .load(name, &source)
            .with_context(|| format!("Failed to parse module {name}"))?;
        log::debug!("Loaded module '{name}' from {}", path.display());
    }
    Ok(library)
}

fn load_config(args: &Args) -> Result<GeneratorConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
            GeneratorConfig::from_json(&json).with_context(|| format!("Invalid configuration {}", path.display()))?
        }
        None => GeneratorConfig::new(default_name(&args.template)),
    };
    if let Some(name) = &args.name {
        config.shader_name.clone_from(name);
    }
    config.features.extend(&args.features);
    Ok(config)
}

fn default_name(template: &Path) -> String {
    let stem = template.file_stem().and_then(|s| s.to_str()).unwrap_or("Shader");
    format!("Generated/{stem}")
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args()?;
    let template = fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template {}", args.template.display()))?;
    let generator = ShaderGenerator::new(load_modules(&args.modules)?);
    let config = load_config(&args)?;

    log::info!(
        "Generating '{}' from {} with {} features",
        config.shader_name,
        args.template.display(),
        config.features.len()
    );
    let output = generator.generate(&template, &config);

    if args.json {
        let diagnostics: Vec<_> = output
            .messages()
            .into_iter()
            .map(|(message, line)| serde_json::json!({ "message": message, "line": line }))
            .collect();
        let report = serde_json::json!({
            "shader_name": config.shader_name,
            "template_id": output.header.id,
            "success": output.is_success(),
            "diagnostics": diagnostics,
            "source": output.source,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (message, line) in output.messages() {
            match line {
                Some(line) => eprintln!("{}:{line}: {message}", args.template.display()),
                None => eprintln!("{}: {message}", args.template.display()),
            }
        }
    }

    let Some(source) = output.source else {
        bail!("Generation of '{}' failed", config.shader_name);
    };

    match &args.out {
        Some(path) => {
            fs::write(path, &source).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Generated: {} ({} bytes)", path.display(), source.len());
        }
        None if !args.json => print!("{source}"),
        None => {}
    }
    Ok(())
}
