use clap::{Parser, Subcommand};

/// Authgate — identity and authorization gateway
#[derive(Parser)]
#[command(name = "authgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8443")]
        port: u16,
    },

    /// Manage registered OAuth clients
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },

    /// Manage vendor organizations and API keys
    Vendor {
        #[command(subcommand)]
        command: VendorCommands,
    },
}

#[derive(Subcommand)]
pub enum ClientCommands {
    /// Register a new OAuth client
    Register {
        #[arg(long)]
        client_id: String,
        /// Client type: public or confidential
        #[arg(long, default_value = "public")]
        client_type: String,
        #[arg(long, value_delimiter = ',')]
        redirect_uris: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        scopes: Vec<String>,
    },
    /// List registered clients
    List,
    /// Soft-disable a client (existing tokens keep their rows)
    Disable {
        #[arg(long)]
        client_id: String,
    },
}

#[derive(Subcommand)]
pub enum VendorCommands {
    /// Create a tenant organization
    CreateOrg {
        #[arg(long)]
        vendor_code: String,
        /// Requests per minute; omit for the configured default
        #[arg(long)]
        rate_limit: Option<i32>,
        /// Restrict to these platforms (empty = unrestricted)
        #[arg(long, value_delimiter = ',')]
        platforms: Option<Vec<String>>,
    },
    /// List organizations
    ListOrgs,
    /// Issue an API key; the secret is printed once and never stored
    IssueKey {
        #[arg(long)]
        vendor_code: String,
        /// Key type: live or test
        #[arg(long, default_value = "live")]
        key_type: String,
        #[arg(long, default_value = "production")]
        environment: String,
    },
    /// Revoke an API key
    RevokeKey {
        #[arg(long)]
        key_id: String,
    },
}
