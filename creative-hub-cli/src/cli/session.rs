use clap::Subcommand;
use creative_hub_core::models::StageId;
use uuid::Uuid;

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a session from a one-sentence idea and run the story stage
    Start {
        /// Seed idea
        seed: String,

        /// Server URL for remote operation (local snapshots when empty)
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show a session (latest local session by default)
    Show {
        /// Session ID
        #[arg(short, long)]
        session: Option<Uuid>,

        /// Server URL for remote operation (local snapshots when empty)
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List sessions
    List {
        /// Server URL for remote operation (local snapshots when empty)
        #[arg(long, default_value = "")]
        server: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Confirm the current stage, advance and run the next one
    Confirm {
        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Go back one stage
    Back {
        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Jump back to an already-visited stage
    Jump {
        /// Target stage (story, script, config, character, storyboard, edit)
        stage: StageId,

        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Re-run the current stage with a change request
    Modify {
        /// What to change
        note: String,

        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Re-run a failed current stage
    Retry {
        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Clear all outputs and return to the first stage
    Reset {
        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Finish the workflow at the last stage
    Complete {
        #[arg(short, long)]
        session: Option<Uuid>,

        #[arg(long, default_value = "")]
        server: String,

        #[arg(long)]
        json: bool,
    },

    /// Delete a session
    Delete {
        /// Session ID
        session: Uuid,

        #[arg(long, default_value = "")]
        server: String,
    },
}
