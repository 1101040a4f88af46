use crate::config::Config;
use crate::database::*;
use crate::error::AppError;
use crate::service::*;
use crate::session::{flash, take_flashes, Level, Visitor};
use actix_session::Session;
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Deserialize;

type Tera = web::Data<tera::Tera>;
type Db = web::Data<sled::Db>;
type Settings = web::Data<Config>;

type Page = Result<HttpResponse, AppError>;

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Turns a form error into a flash message and sends the visitor back to
/// `location`. Internal errors pass through unchanged.
fn bounce(session: &Session, err: AppError, location: &str) -> Page {
    if !err.is_recoverable() {
        return Err(err);
    }
    log::debug!("{:?}, redirecting to {}", err, location);
    flash(session, Level::Error, err.to_string())?;
    Ok(redirect(location))
}

/// Splits a lookup into the record or the message to display in its place.
fn found<T>(result: Result<T, AppError>) -> Result<Result<T, String>, AppError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(AppError::NotFound(message)) => Ok(Err(message)),
        Err(err) => Err(err),
    }
}

fn render(
    tera: &tera::Tera,
    session: &Session,
    visitor: &Visitor,
    template: &str,
    mut ctx: tera::Context,
) -> Page {
    ctx.insert("username", &visitor.username());
    ctx.insert("flashes", &take_flashes(session));
    let body = tera.render(template, &ctx)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

async fn index(visitor: Visitor, session: Session, tera: Tera, db: Db) -> Page {
    let mut ctx = tera::Context::new();
    let films = db.films()?.into_iter().map(|(_, film)| film).collect::<Vec<_>>();
    ctx.insert("films", &films);
    if let Some(username) = visitor.username() {
        ctx.insert("tickets", &db.tickets_for_user(username)?);
    }
    render(&tera, &session, &visitor, "index.html", ctx)
}

async fn login(req: HttpRequest, visitor: Visitor, session: Session, tera: Tera) -> Page {
    let mut ctx = tera::Context::new();
    ctx.insert("logged_out", &(req.query_string() == "logout"));
    render(&tera, &session, &visitor, "login.html", ctx)
}

async fn login_post(
    req: HttpRequest,
    params: web::Form<LoginForm>,
    session: Session,
    db: Db,
) -> Page {
    match authenticate(&db, &params) {
        Ok(username) => {
            Visitor::login(&req, &username)?;
            Ok(redirect("/ticket"))
        }
        Err(err) => bounce(&session, err, "/login"),
    }
}

async fn logout(req: HttpRequest) -> HttpResponse {
    Visitor::logout(&req);
    redirect("/login?logout")
}

async fn register_page(visitor: Visitor, session: Session, tera: Tera) -> Page {
    render(&tera, &session, &visitor, "register.html", tera::Context::new())
}

async fn register_post(
    params: web::Form<RegisterForm>,
    session: Session,
    db: Db,
    settings: Settings,
) -> Page {
    match register(&db, &params, settings.bcrypt_cost) {
        Ok(_user_id) => {
            flash(
                &session,
                Level::Success,
                "Registration successful! You can now log in.",
            )?;
            Ok(redirect("/login"))
        }
        Err(err) => bounce(&session, err, "/register"),
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct FilmForm {
    film: String,
}

async fn ticket(visitor: Visitor, session: Session, tera: Tera, db: Db) -> Page {
    let mut ctx = tera::Context::new();
    let films = db.films()?.into_iter().map(|(_, film)| film).collect::<Vec<_>>();
    ctx.insert("films", &films);
    render(&tera, &session, &visitor, "ticket.html", ctx)
}

async fn ticket_post(
    params: web::Form<FilmForm>,
    visitor: Visitor,
    session: Session,
    tera: Tera,
) -> Page {
    if let Err(err) = require(&[("film", params.film.as_str())]) {
        return bounce(&session, err, "/ticket");
    }
    let mut ctx = tera::Context::new();
    ctx.insert("film_title", &params.film);
    render(&tera, &session, &visitor, "buy.html", ctx)
}

#[derive(Deserialize, Debug, Default)]
struct FilmQuery {
    film: Option<String>,
}

async fn buy(
    query: web::Query<FilmQuery>,
    visitor: Visitor,
    session: Session,
    tera: Tera,
) -> Page {
    let mut ctx = tera::Context::new();
    if let Some(film) = &query.film {
        ctx.insert("film_title", film);
    }
    render(&tera, &session, &visitor, "buy.html", ctx)
}

/// Checks login and form data, then issues the ticket. On a form error the
/// redirect to show is returned instead.
fn purchase(
    db: &sled::Db,
    visitor: &Visitor,
    session: &Session,
    params: TicketForm,
) -> Result<Result<crate::model::Ticket, HttpResponse>, AppError> {
    let owner = match visitor.require() {
        Ok(owner) => owner,
        Err(err) => return bounce(session, err, "/login").map(Err),
    };
    let new_ticket = match params.validate() {
        Ok(new_ticket) => new_ticket,
        Err(err) => return bounce(session, err, "/buy").map(Err),
    };
    create_ticket(db, &mut rand::thread_rng(), owner, new_ticket).map(Ok)
}

async fn buy_post(
    params: web::Form<TicketForm>,
    visitor: Visitor,
    session: Session,
    db: Db,
) -> Page {
    match purchase(&db, &visitor, &session, params.into_inner())? {
        Ok(ticket) => Ok(redirect(&format!(
            "/thanks?ticket_number={}",
            ticket.ticket_number
        ))),
        Err(bounced) => Ok(bounced),
    }
}

#[derive(Deserialize, Debug, Default)]
struct ThanksQuery {
    ticket_number: Option<String>,
}

async fn thanks(
    query: web::Query<ThanksQuery>,
    visitor: Visitor,
    session: Session,
    tera: Tera,
    db: Db,
) -> Page {
    let mut ctx = tera::Context::new();
    match found(lookup_ticket(&db, query.ticket_number.as_deref().unwrap_or("")))? {
        Ok(ticket) => ctx.insert("ticket", &ticket),
        Err(missing) => {
            log::debug!("No ticket for confirmation {:?}", query.ticket_number);
            ctx.insert("error", &missing);
        }
    }
    render(&tera, &session, &visitor, "thanks.html", ctx)
}

async fn thanks_post(
    params: web::Form<TicketForm>,
    visitor: Visitor,
    session: Session,
    tera: Tera,
    db: Db,
) -> Page {
    match purchase(&db, &visitor, &session, params.into_inner())? {
        Ok(ticket) => {
            let mut ctx = tera::Context::new();
            ctx.insert("ticket", &ticket);
            render(&tera, &session, &visitor, "thanks.html", ctx)
        }
        Err(bounced) => Ok(bounced),
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct LookupForm {
    ticket_number: String,
}

async fn lookup(visitor: Visitor, session: Session, tera: Tera) -> Page {
    render(&tera, &session, &visitor, "lookup.html", tera::Context::new())
}

async fn lookup_post(
    params: web::Form<LookupForm>,
    visitor: Visitor,
    session: Session,
    tera: Tera,
    db: Db,
) -> Page {
    let mut ctx = tera::Context::new();
    ctx.insert("searched", &params.ticket_number);
    match found(lookup_ticket(&db, &params.ticket_number))? {
        Ok(ticket) => ctx.insert("ticket", &ticket),
        Err(missing) => ctx.insert("error", &missing),
    }
    render(&tera, &session, &visitor, "lookup.html", ctx)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .route(web::get().to(index))
            .route(web::post().to(index)),
    )
    .service(
        web::resource("/login")
            .route(web::get().to(login))
            .route(web::post().to(login_post)),
    )
    .route("/logout", web::get().to(logout))
    .service(
        web::resource("/register")
            .route(web::get().to(register_page))
            .route(web::post().to(register_post)),
    )
    .service(
        web::resource("/ticket")
            .route(web::get().to(ticket))
            .route(web::post().to(ticket_post)),
    )
    .service(
        web::resource("/buy")
            .route(web::get().to(buy))
            .route(web::post().to(buy_post)),
    )
    .service(
        web::resource("/thanks")
            .route(web::get().to(thanks))
            .route(web::post().to(thanks_post)),
    )
    .service(
        web::resource("/goruntule")
            .route(web::get().to(lookup))
            .route(web::post().to(lookup_post)),
    );
}
