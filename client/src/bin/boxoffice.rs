//! Box Office command-line client
//!
//! Drives the booking flow against a running backend:
//!
//! ```bash
//! boxoffice login <token>
//! boxoffice event <event-id>
//! boxoffice reserve <event-id> <ticket-type> <quantity>
//! boxoffice checkout <event-id> [--promo CODE] [--accept-terms]
//! boxoffice guard <admin|publisher|organization|checkout>
//! boxoffice clear
//! ```
//!
//! Configuration comes from `BOXOFFICE_*` environment variables, optionally
//! loaded from a `.env` file.

use boxoffice_client::{
    Access, Area, BookingDraftStore, CheckoutAction, CheckoutEnvironment, CheckoutReducer,
    CheckoutState, ClientStorage, Config, EventId, EventPage, FileStorage, HttpBackend,
    SessionGuard, Submission, TicketingBackend,
};
use boxoffice_core::environment::{Clock, SystemClock};
use boxoffice_runtime::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
usage:
  boxoffice login <token>
  boxoffice event <event-id>
  boxoffice reserve <event-id> <ticket-type> <quantity>
  boxoffice checkout <event-id> [--promo CODE] [--accept-terms]
  boxoffice guard <admin|publisher|organization|checkout>
  boxoffice clear";

struct App {
    config: Config,
    clock: Arc<dyn Clock>,
    drafts: BookingDraftStore,
    session: SessionGuard,
    backend: Arc<dyn TicketingBackend>,
}

impl App {
    fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let storage: Arc<dyn ClientStorage> = Arc::new(FileStorage::new(config.state_path.clone()));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend = HttpBackend::new(&config.api_url, config.request_timeout())?;

        Ok(Self {
            drafts: BookingDraftStore::new(Arc::clone(&storage), config.pricing()),
            session: SessionGuard::new(storage, Arc::clone(&clock))
                .with_expired_redirect_delay(config.expired_redirect_delay()),
            backend: Arc::new(backend),
            clock,
            config,
        })
    }

    fn event_page(&self) -> EventPage {
        EventPage::new(Arc::clone(&self.backend), self.drafts.clone(), self.session.clone())
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=info,boxoffice_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(error) = run(&args).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let app = App::new(Config::from_env())?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["login", token] => login(&app, token),
        ["event", event_id] => show_event(&app, EventId::new(*event_id)).await,
        ["reserve", event_id, ticket_type, quantity] => {
            reserve(&app, EventId::new(*event_id), ticket_type, quantity.parse()?).await
        },
        ["checkout", event_id, options @ ..] => {
            checkout(&app, EventId::new(*event_id), options).await
        },
        ["guard", area] => {
            guard(&app, area.parse()?);
            Ok(())
        },
        ["clear"] => {
            app.drafts.clear()?;
            println!("Booking cleared.");
            Ok(())
        },
        _ => Err(USAGE.into()),
    }
}

fn login(app: &App, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let claims = app.session.sign_in(token)?;
    let who = claims.email.as_deref().or(claims.sub.as_deref()).unwrap_or("<unknown>");
    println!("Signed in as {who}");
    if !claims.capabilities.is_empty() {
        println!("Capabilities: {}", claims.capabilities.join(", "));
    }
    if claims.is_expired(app.clock.now()) {
        println!("Warning: this token has already expired.");
    }
    Ok(())
}

async fn show_event(app: &App, event_id: EventId) -> Result<(), Box<dyn std::error::Error>> {
    let view = app.event_page().load(event_id).await?;
    let event = &view.event;

    println!("{} ({})", event.title, event.id);
    if event.is_free_event {
        println!("Free event");
    }
    for tier in &event.ticket_types {
        let remaining = tier
            .remaining
            .map_or_else(String::new, |left| format!(", {left} left"));
        println!("  {:<16} {} {}{remaining}", tier.name, tier.price, event.currency);
    }
    if let Some(publisher) = &view.publisher {
        println!(
            "Contact: {} {}",
            publisher.name.as_deref().unwrap_or(&publisher.email),
            publisher.phone.as_deref().unwrap_or_default()
        );
    }
    if let Some(draft) = &view.draft {
        println!(
            "Reserved: {} × {}, ready for checkout",
            draft.quantity, draft.ticket_type
        );
    }
    Ok(())
}

async fn reserve(
    app: &App,
    event_id: EventId,
    ticket_type: &str,
    quantity: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = app.event_page();
    let mut view = page.load(event_id).await?;
    let draft = page.reserve(&mut view, ticket_type, quantity)?;

    println!("{} × {} for {}", draft.quantity, draft.ticket_type, view.event.title);
    println!("  Price  {} {}", draft.price, draft.currency);
    println!("  Fees   {} {}", draft.fees, draft.currency);
    println!("  VAT    {} {}", draft.vat, draft.currency);
    println!("  Total  {} {}", draft.total, draft.currency);
    Ok(())
}

fn guard(app: &App, area: Area) {
    match app.session.check(area) {
        Access::Granted(claims) => println!(
            "Access granted ({})",
            claims.email.as_deref().unwrap_or("signed in")
        ),
        Access::RedirectToLogin => println!("Not signed in. Redirecting to login."),
        Access::SessionExpired { redirect_after } => println!(
            "Your session has expired. Redirecting to login in {} ms.",
            redirect_after.as_millis()
        ),
        Access::AccessDenied => println!("Access denied."),
    }
}

async fn checkout(
    app: &App,
    event_id: EventId,
    options: &[&str],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut promo_code = None;
    let mut accept_terms = false;
    let mut rest = options.iter();
    while let Some(option) = rest.next() {
        match *option {
            "--accept-terms" => accept_terms = true,
            "--promo" => promo_code = rest.next().map(|code| (*code).to_string()),
            other => return Err(format!("unknown option: {other}\n{USAGE}").into()),
        }
    }

    let env = CheckoutEnvironment::new(
        Arc::clone(&app.clock),
        app.drafts.clone(),
        app.session.clone(),
        Arc::clone(&app.backend),
    )
    .with_window_seconds(app.config.reservation_secs);
    let store = Store::new(CheckoutState::new(), CheckoutReducer::new(), env);

    store.send(CheckoutAction::ScreenMounted { event_id }).await?;
    let mounted = store.state(CheckoutState::clone).await;
    let Some(draft) = &mounted.draft else {
        println!("{}", mounted.error_message().unwrap_or("No booking found."));
        return Ok(());
    };
    println!(
        "{} × {}: total {} {} (reserved for {})",
        draft.quantity,
        draft.ticket_type,
        draft.total,
        draft.currency,
        mounted.window.display()
    );

    store.send(CheckoutAction::TermsAccepted(accept_terms)).await?;
    store.send(CheckoutAction::ResalePolicyAccepted(accept_terms)).await?;
    if let Some(code) = promo_code {
        store.send(CheckoutAction::PromoCodeEntered(code)).await?;
    }

    println!("{}...", mounted.submit_label());
    let mut handle = store.send(CheckoutAction::Submit).await?;
    handle.wait().await;

    let state = store.state(CheckoutState::clone).await;
    if let Some(message) = state.error_message() {
        println!("{message}");
    }
    if let Some(route) = state.route {
        println!("Redirecting to {route:?}.");
    }
    if let Submission::Succeeded { receipt, .. } = &state.submission {
        match state.confirmation() {
            Some(confirmation) => println!("{}", confirmation.render_terminal()),
            None => println!("Booking confirmed: {receipt}"),
        }
        store.send(CheckoutAction::ConfirmationDismissed).await?;
    }
    if let Some(notice) = state.notice {
        println!("{}", notice.message());
    }

    store.send(CheckoutAction::ScreenUnmounted).await?;
    store.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
