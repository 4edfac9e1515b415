use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Agromart client binary.
#[derive(Debug, Parser)]
#[command(
    name = "agromart",
    version,
    about = "Agromart marketplace client backed by the local query cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "AGROMART_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List lands, optionally only those owned by one user.
    Lands(LandsArgs),
    /// List pest-control products.
    Products(ProductsArgs),
    /// List orders of the signed-in user, or every order with `--all`.
    Orders(OrdersArgs),
    /// Show a user profile.
    Profile(ProfileArgs),
    /// Sign in and print the issued credentials.
    Login(LoginArgs),
    /// Price a cart against the product listing and place the order.
    Checkout(CheckoutArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the REST API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the per-request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Bearer token sent with every request.
    #[arg(
        long = "api-token",
        env = "AGROMART_TOKEN",
        value_name = "TOKEN",
        global = true,
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    /// Override the number of unsubscribed cache entries kept.
    #[arg(long = "cache-max-idle-entries", value_name = "COUNT", global = true)]
    pub cache_max_idle_entries: Option<u64>,

    /// Override how long an unsubscribed cache entry is kept.
    #[arg(long = "cache-keep-unused-seconds", value_name = "SECONDS", global = true)]
    pub cache_keep_unused_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LandsArgs {
    /// Only lands owned by this user id.
    #[arg(long, value_name = "USER_ID")]
    pub user: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ProductsArgs {
    /// Only products of this category (Organic, Biological, Botanical, ...).
    #[arg(long, value_name = "CATEGORY")]
    pub category: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct OrdersArgs {
    /// List every order (admin only).
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub all: bool,
}

#[derive(Debug, Args, Clone)]
pub struct ProfileArgs {
    /// User id whose profile to show.
    #[arg(value_name = "USER_ID")]
    pub user: String,
}

#[derive(Debug, Args, Clone)]
pub struct LoginArgs {
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    #[arg(
        long,
        env = "AGROMART_PASSWORD",
        value_name = "PASSWORD",
        hide_env_values = true
    )]
    pub password: String,
}

#[derive(Debug, Args, Clone)]
pub struct CheckoutArgs {
    /// Cart line as `PRODUCT_ID=QUANTITY`; repeat for several products.
    #[arg(
        long = "item",
        value_name = "PRODUCT_ID=QUANTITY",
        value_parser = parse_cart_item,
        required = true
    )]
    pub items: Vec<CartItemArg>,

    /// Print the priced cart without placing the order.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItemArg {
    pub product_id: String,
    pub quantity: i64,
}

fn parse_cart_item(value: &str) -> Result<CartItemArg, String> {
    let (product_id, quantity) = value
        .split_once('=')
        .ok_or_else(|| format!("expected PRODUCT_ID=QUANTITY, got `{value}`"))?;
    let product_id = product_id.trim();
    if product_id.is_empty() {
        return Err("product id must not be empty".to_string());
    }
    let quantity = quantity
        .trim()
        .parse::<i64>()
        .map_err(|err| format!("invalid quantity `{quantity}`: {err}"))?;
    Ok(CartItemArg {
        product_id: product_id.to_string(),
        quantity,
    })
}
