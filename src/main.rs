use std::{io::Write, process, sync::Arc};

use agromart::{
    application::{
        auth::AuthService,
        checkout::{CheckoutService, build_order},
        error::AppError,
    },
    cache::{CacheConfig, CacheKey, QueryClient, QueryResult},
    cart::{Cart, CartProjection},
    config::{self, CheckoutArgs, Command},
    infra::{http::HttpTransport, session::Session, telemetry},
};
use agromart_api_types::{LoginRequest, ProductCategory};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let messages = error.messages();
    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?messages, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?messages, "application error");
    });
}

struct AppContext {
    client: QueryClient,
    session: Arc<Session>,
}

impl AppContext {
    fn build(settings: &config::Settings) -> Result<Self, AppError> {
        let session = Arc::new(match settings.api.token.as_deref() {
            Some(token) => Session::with_token(token),
            None => Session::new(),
        });
        let transport = HttpTransport::new(&settings.api, session.clone())?;
        let client = QueryClient::new(CacheConfig::from(&settings.cache), Arc::new(transport));
        Ok(Self { client, session })
    }
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    info!(
        target = "agromart::cli",
        base_url = %settings.api.base_url,
        authenticated = settings.api.token.is_some(),
        "Starting agromart client"
    );

    let app = AppContext::build(&settings)?;

    match cli_args.command {
        Command::Lands(args) => {
            let key = args
                .user
                .map(CacheKey::user_lands)
                .unwrap_or_else(CacheKey::lands);
            print_query(app.client.query(&key).await)
        }
        Command::Products(args) => {
            let category = args
                .category
                .as_deref()
                .map(|raw| {
                    ProductCategory::parse(raw)
                        .ok_or_else(|| AppError::validation(format!("unknown category `{raw}`")))
                })
                .transpose()?;
            print_query(app.client.query(&CacheKey::products(category)).await)
        }
        Command::Orders(args) => {
            let key = if args.all {
                CacheKey::all_orders()
            } else {
                CacheKey::user_orders()
            };
            print_query(app.client.query(&key).await)
        }
        Command::Profile(args) => {
            print_query(app.client.query(&CacheKey::profile(args.user)).await)
        }
        Command::Login(args) => {
            let auth = AuthService::new(app.client.clone(), app.session.clone());
            let response = auth
                .login(LoginRequest {
                    email: args.email,
                    password: args.password,
                })
                .await?;
            print_json(&response)
        }
        Command::Checkout(args) => run_checkout(&app, args).await,
    }
}

async fn run_checkout(app: &AppContext, args: CheckoutArgs) -> Result<(), AppError> {
    let cart = Cart::new();
    for item in &args.items {
        cart.set_quantity(&item.product_id, item.quantity);
    }

    let projection = CartProjection::new(app.client.clone(), cart);
    let checkout = CheckoutService::new(app.client.clone(), projection, app.session.clone());

    if args.dry_run {
        let summary = checkout.summary().await;
        build_order(&summary).map_err(|err| AppError::validation(err.to_string()))?;
        return print_json(&summary);
    }

    let placed = checkout.place_order().await?;
    print_json(&placed.response)
}

fn print_query(result: QueryResult) -> Result<(), AppError> {
    if let Some(error) = result.error {
        return Err(AppError::Query(error));
    }
    match result.data {
        Some(data) => print_json(&*data),
        None => print_json(&serde_json::Value::Null),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)?;
    let mut stdout = std::io::stdout().lock();
    // A closed pipe (e.g. `| head`) is not an application error.
    let _ = writeln!(stdout, "{rendered}");
    Ok(())
}
