use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use dirpg_filter::{Filter, FilterCompiler};
use dirpg_schema::{Dn, Schema};
use dirpg_server::ServerConfig;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::CheckConfig(args) => cmd_check_config(args, json),
        Command::CompileFilter(args) => cmd_compile_filter(args, json),
        Command::ParseDn(args) => cmd_parse_dn(args, json),
        Command::Schema(args) => cmd_schema(args, json),
    }
}

/// Load a configuration, or fall back to the defaults when none is given.
fn load_config(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ServerConfig::default()),
    }
}

fn load_schema(path: Option<&Path>) -> anyhow::Result<(ServerConfig, Schema)> {
    let config = load_config(path)?;
    let schema = config.build_schema().context("invalid schema")?;
    debug!(
        attribute_types = schema.attribute_types().count(),
        object_classes = schema.object_classes().count(),
        "schema loaded"
    );
    Ok((config, schema))
}

fn cmd_check_config(args: CheckConfigArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(Some(args.path.as_path()))?;
    let schema = config
        .validate()
        .with_context(|| format!("{} is not valid", args.path.display()))?;
    if json {
        println!(
            "{}",
            json!({
                "valid": true,
                "suffix": config.suffix,
                "acl_rules": config.acl.len(),
                "pass_through": config.pass_through.iter().map(|p| &p.domain).collect::<Vec<_>>(),
                "max_retry": config.max_retry,
            })
        );
        return Ok(());
    }
    println!("{} {} is valid", "✓".green().bold(), args.path.display());
    println!("  Suffix: {}", config.suffix.cyan());
    if !config.root_dn.is_empty() {
        println!("  Root DN: {}", config.root_dn.cyan());
    }
    println!(
        "  Schema: {} attribute types, {} object classes",
        schema.attribute_types().count().to_string().bold(),
        schema.object_classes().count().to_string().bold()
    );
    println!("  ACL rules: {}", config.acl.len());
    for pt in &config.pass_through {
        println!("  Pass-through: {} → {}", pt.domain.yellow(), pt.server);
    }
    Ok(())
}

fn cmd_compile_filter(args: CompileFilterArgs, json: bool) -> anyhow::Result<()> {
    let (config, schema) = load_schema(args.config.as_deref())?;
    let filter = Filter::parse(&args.filter)?;
    let column = args.column.unwrap_or(config.predicate_column);
    let compiled = FilterCompiler::new(&schema)
        .with_column(column)
        .compile(&filter)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
        return Ok(());
    }
    println!("{} {}", "filter:".dimmed(), filter);
    println!("{} {}", "where:".dimmed(), compiled.predicate.bold());
    for (i, param) in compiled.params.iter().enumerate() {
        println!("  :{} = {}", i.to_string().yellow(), param);
    }
    Ok(())
}

fn cmd_parse_dn(args: ParseDnArgs, json: bool) -> anyhow::Result<()> {
    let (_, schema) = load_schema(args.config.as_deref())?;
    let dn = Dn::parse(&schema, &args.dn)?;
    let parent = dn.parent().map(|p| p.norm_string());
    if json {
        println!(
            "{}",
            json!({
                "orig": dn.to_string(),
                "norm": dn.norm_string(),
                "depth": dn.depth(),
                "parent": parent,
            })
        );
        return Ok(());
    }
    println!("{} {}", "orig:".dimmed(), dn);
    println!("{} {}", "norm:".dimmed(), dn.norm_string().bold());
    println!("{} {}", "depth:".dimmed(), dn.depth());
    match parent {
        Some(parent) => println!("{} {}", "parent:".dimmed(), parent),
        None => println!("{} (root)", "parent:".dimmed()),
    }
    Ok(())
}

fn cmd_schema(args: SchemaArgs, json: bool) -> anyhow::Result<()> {
    let (_, schema) = load_schema(args.config.as_deref())?;

    if let Some(name) = &args.name {
        if let Some(at) = schema.attribute_type(name).filter(|_| !args.classes) {
            if json {
                println!("{}", serde_json::to_string_pretty(at.as_ref())?);
            } else {
                println!("{} {} ({})", "attribute".green(), at.name.bold(), at.oid);
                println!("  matching: {:?}", at.matching_rule());
                println!("  single-valued: {}", at.single_value);
                println!("  operational: {}", at.is_operational());
                if at.association {
                    println!("  association: {}", "yes".yellow());
                }
            }
            return Ok(());
        }
        if let Some(oc) = schema.object_class(name).filter(|_| !args.attributes) {
            if json {
                println!("{}", serde_json::to_string_pretty(oc.as_ref())?);
            } else {
                println!("{} {} ({}, {:?})", "class".green(), oc.name.bold(), oc.oid, oc.kind);
                println!("  must: {}", schema.required_attributes(oc).into_iter().collect::<Vec<_>>().join(", "));
                println!("  may: {}", oc.may.join(", "));
            }
            return Ok(());
        }
        anyhow::bail!("{name}: not defined in the schema");
    }

    let mut names: Vec<(&str, &str)> = Vec::new();
    if !args.classes {
        names.extend(schema.attribute_types().map(|at| ("attribute", at.name.as_str())));
    }
    if !args.attributes {
        names.extend(schema.object_classes().map(|oc| ("class", oc.name.as_str())));
    }
    names.sort_by_key(|(kind, name)| (*kind, name.to_lowercase()));
    names.dedup();
    if json {
        let list: Vec<_> = names
            .iter()
            .map(|(kind, name)| json!({ "kind": kind, "name": name }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    for (kind, name) in names {
        println!("{:<10} {}", kind.dimmed(), name);
    }
    Ok(())
}
