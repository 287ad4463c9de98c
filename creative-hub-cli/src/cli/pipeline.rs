use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum PipelineCommands {
    /// List available pipeline templates
    Templates {
        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Create a pipeline, optionally from a template
    Create {
        /// Template id (e.g. image-pipeline)
        #[arg(short, long)]
        template: Option<String>,

        /// Pipeline title
        #[arg(long)]
        title: Option<String>,

        /// Pipeline description
        #[arg(short, long)]
        description: Option<String>,

        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one pipeline
    Get {
        /// Pipeline ID
        id: String,

        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List all pipelines
    List {
        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Execute one step by id or type
    Step {
        /// Pipeline ID
        id: String,

        /// Step id (step-1) or step type (prompt_optimize)
        step: String,

        /// Step input as a JSON object, e.g. '{"prompt": "cat"}'
        #[arg(short, long)]
        input: Option<String>,

        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the remaining steps in the background
    Run {
        /// Pipeline ID
        id: String,

        /// Initial input as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Poll until the run finishes
        #[arg(short, long)]
        wait: bool,

        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Stream an optimized prompt as it is generated
    Optimize {
        /// Prompt to optimize
        prompt: String,

        /// Config file supplying the stream timeout
        #[arg(long, default_value = "")]
        config_file: String,

        /// Server URL for remote operation
        #[arg(long, default_value = "")]
        server: String,
    },
}
