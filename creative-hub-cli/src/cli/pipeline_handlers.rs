use super::handlers::{load_config, server_url};
use super::pipeline::PipelineCommands;

use anyhow::{Context, Result};
use creative_hub_core::client::HubClient;
use creative_hub_core::models::{CreatePipelineRequest, Pipeline, PipelineStatus};
use creative_hub_core::workflow::CancellationToken;
use serde_json::Value;
use std::io::Write;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn handle_pipeline_commands(command: PipelineCommands) -> Result<()> {
    match command {
        PipelineCommands::Templates { server, json } => {
            handle_pipeline_templates(server, json).await?;
        }
        PipelineCommands::Create {
            template,
            title,
            description,
            server,
            json,
        } => {
            handle_pipeline_create(template, title, description, server, json).await?;
        }
        PipelineCommands::Get { id, server, json } => {
            handle_pipeline_get(id, server, json).await?;
        }
        PipelineCommands::List { server, json } => {
            handle_pipeline_list(server, json).await?;
        }
        PipelineCommands::Step {
            id,
            step,
            input,
            server,
            json,
        } => {
            handle_pipeline_step(id, step, input, server, json).await?;
        }
        PipelineCommands::Run {
            id,
            input,
            wait,
            server,
            json,
        } => {
            handle_pipeline_run(id, input, wait, server, json).await?;
        }
        PipelineCommands::Optimize {
            prompt,
            config_file,
            server,
        } => {
            handle_pipeline_optimize(prompt, config_file, server).await?;
        }
    }
    Ok(())
}

/// Parse `--input`; it must be a JSON object
pub fn parse_input(input: Option<String>) -> Result<Option<Value>> {
    let Some(raw) = input else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(&raw).context("--input must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--input must be a JSON object");
    }
    Ok(Some(value))
}

async fn handle_pipeline_templates(server: String, json: bool) -> Result<()> {
    let client = HubClient::new(server_url(&server));
    let templates = client.templates().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
    } else {
        println!("Templates ({}):", templates.len());
        for template in templates {
            println!("  {} - {}", template.id, template.name);
            println!("    steps: {}", template.steps.join(" → "));
        }
    }
    Ok(())
}

async fn handle_pipeline_create(
    template: Option<String>,
    title: Option<String>,
    description: Option<String>,
    server: String,
    json: bool,
) -> Result<()> {
    let client = HubClient::new(server_url(&server));
    let request = CreatePipelineRequest {
        title,
        description,
        template_id: template,
    };
    let pipeline = client.create_pipeline(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        println!("Pipeline created:");
        print_pipeline(&pipeline);
    }
    Ok(())
}

async fn handle_pipeline_get(id: String, server: String, json: bool) -> Result<()> {
    let client = HubClient::new(server_url(&server));
    let pipeline = client.get_pipeline(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        print_pipeline(&pipeline);
    }
    Ok(())
}

async fn handle_pipeline_list(server: String, json: bool) -> Result<()> {
    let client = HubClient::new(server_url(&server));
    let pipelines = client.list_pipelines().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pipelines)?);
    } else if pipelines.is_empty() {
        println!("No pipelines");
    } else {
        for pipeline in pipelines {
            println!(
                "{}  {:<10} {} ({} steps)",
                pipeline.id,
                pipeline.status,
                pipeline.title,
                pipeline.steps.len()
            );
        }
    }
    Ok(())
}

async fn handle_pipeline_step(
    id: String,
    step: String,
    input: Option<String>,
    server: String,
    json: bool,
) -> Result<()> {
    let input = parse_input(input)?;
    let client = HubClient::new(server_url(&server));
    let execution = client.execute_step(&id, &step, input).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        println!("Step {} completed ({:?})", execution.step, execution.source);
        if let Some(reason) = &execution.fallback_reason {
            println!("  ⚠️  fallback: {}", reason);
        }
        println!("{}", serde_json::to_string_pretty(&execution.output)?);
        match &execution.next_step {
            Some(next) => println!("Next step: {}", next),
            None => println!("Workflow complete"),
        }
    }
    Ok(())
}

async fn handle_pipeline_run(
    id: String,
    input: Option<String>,
    wait: bool,
    server: String,
    json: bool,
) -> Result<()> {
    let input = parse_input(input)?;
    let client = HubClient::new(server_url(&server));
    let ticket = client.run_pipeline(&id, input).await?;

    if !wait {
        if json {
            println!("{}", serde_json::to_string_pretty(&ticket)?);
        } else {
            println!(
                "Run {} started: {} steps ({})",
                ticket.task_id, ticket.total_steps, ticket.status
            );
        }
        return Ok(());
    }

    let pipeline = loop {
        let pipeline = client.get_pipeline(&id).await?;
        if matches!(
            pipeline.status,
            PipelineStatus::Completed | PipelineStatus::Failed
        ) {
            break pipeline;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&pipeline)?);
    } else {
        print_pipeline(&pipeline);
    }
    if pipeline.status == PipelineStatus::Failed {
        anyhow::bail!("Pipeline {} failed", pipeline.id);
    }
    Ok(())
}

async fn handle_pipeline_optimize(prompt: String, config_file: String, server: String) -> Result<()> {
    let (_, config) = load_config(&config_file)?;
    let timeout = Duration::from_millis(config.stream_timeout_ms);
    let client = HubClient::new(server_url(&server));

    let token = CancellationToken::new();
    let interrupt = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel("interrupted");
        }
    });

    let result = client
        .stream_prompt(&prompt, timeout, &token, |chunk| {
            print!("{}", chunk);
            let _ = std::io::stdout().flush();
        })
        .await;
    watcher.abort();

    let outcome = result?;
    println!();
    if let Some(tags) = outcome
        .metadata
        .as_ref()
        .and_then(|m| m.get("tags"))
        .and_then(Value::as_array)
    {
        let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
        println!("tags: {}", tags.join(", "));
    }
    Ok(())
}

fn print_pipeline(pipeline: &Pipeline) {
    println!("  ID: {}", pipeline.id);
    println!("  Title: {}", pipeline.title);
    if let Some(description) = &pipeline.description {
        println!("  Description: {}", description);
    }
    println!("  Status: {}", pipeline.status);
    println!("  Updated: {}", pipeline.updated_at);
    for step in &pipeline.steps {
        println!(
            "    {} {:<16} {:<10} {}",
            step.id, step.step_type, step.status, step.name
        );
        if let Some(error) = &step.error {
            println!("      error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input(None).unwrap(), None);
        assert_eq!(
            parse_input(Some(r#"{"prompt": "cat"}"#.to_string()))
                .unwrap()
                .unwrap()["prompt"],
            "cat"
        );
        assert!(parse_input(Some("[1, 2]".to_string())).is_err());
        assert!(parse_input(Some("{not json".to_string())).is_err());
    }
}
