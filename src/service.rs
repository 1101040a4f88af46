use crate::database::{DbError, TicketDb, UserDb};
use crate::error::AppError;
use crate::model::*;
use rand::Rng;
use serde::Deserialize;
use std::ops::RangeInclusive;

pub const TICKET_NUMBERS: RangeInclusive<u32> = 100_000..=999_999;

/// Fails with a validation error naming every empty field.
pub fn require(fields: &[(&str, &str)]) -> Result<(), AppError> {
    let missing = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Missing form data: {}",
            missing.join(", ")
        )))
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

fn email_taken() -> AppError {
    AppError::Conflict("This email address is already in use. Please use another one.".to_owned())
}

/// Usernames and emails are stored and looked up trimmed. Passwords are
/// taken as typed, so only an empty password is rejected.
pub fn register(db: &sled::Db, form: &RegisterForm, cost: u32) -> Result<u64, AppError> {
    let username = form.username.trim();
    let email = form.email.trim();
    if username.is_empty() || email.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation("All fields must be filled in.".to_owned()));
    }
    if db.get_user_by_email(email)?.is_some() {
        return Err(email_taken());
    }
    let user = User {
        username: username.to_owned(),
        email: email.to_owned(),
        password_hash: bcrypt::hash(&form.password, cost)?,
    };
    match db.add_user(&user) {
        Ok(id) => {
            log::info!("Registered user {} ({})", user.username, id);
            Ok(id)
        }
        // Lost a race with a concurrent registration.
        Err(DbError::EmailTaken) => Err(email_taken()),
        Err(DbError::UsernameTaken) => Err(AppError::Conflict(
            "This username is already taken. Please choose another one.".to_owned(),
        )),
        Err(err) => Err(err.into()),
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Checks the credentials and returns the stored username.
pub fn authenticate(db: &sled::Db, form: &LoginForm) -> Result<String, AppError> {
    let username = form.username.trim();
    if username.is_empty() || form.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password cannot be empty.".to_owned(),
        ));
    }
    if let Some((_user_id, user)) = db.get_user_by_username(username)? {
        if bcrypt::verify(&form.password, &user.password_hash)? {
            return Ok(user.username);
        }
    }
    Err(AppError::Auth("Incorrect username or password.".to_owned()))
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct TicketForm {
    pub cinema: String,
    pub seat: String,
    pub time: String,
    pub film: String,
}

impl TicketForm {
    pub fn validate(self) -> Result<NewTicket, AppError> {
        require(&[
            ("cinema", self.cinema.as_str()),
            ("seat", self.seat.as_str()),
            ("time", self.time.as_str()),
            ("film", self.film.as_str()),
        ])?;
        Ok(NewTicket {
            cinema: self.cinema,
            seat: self.seat,
            showtime: self.time,
            film: self.film,
        })
    }
}

pub fn ticket_number<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(TICKET_NUMBERS)
}

/// Issues a ticket with a random number and stores it.
///
/// The number is not checked against existing tickets. If it is already
/// taken the store refuses the insert and the purchase fails.
pub fn create_ticket<R: Rng>(
    db: &sled::Db,
    rng: &mut R,
    owner: &str,
    ticket: NewTicket,
) -> Result<Ticket, AppError> {
    let ticket = ticket.issue(ticket_number(rng), owner);
    match db.add_ticket(&ticket) {
        Ok(()) => {
            log::info!("Issued ticket {} to {}", ticket.ticket_number, owner);
            Ok(ticket)
        }
        Err(DbError::TicketNumberTaken(number)) => {
            log::warn!("Ticket number collision on {}", number);
            Err(DbError::TicketNumberTaken(number).into())
        }
        Err(err) => Err(err.into()),
    }
}

/// Finds a ticket by free-form number text. Anything that is not a stored
/// ticket number, numeric or not, is `NotFound`.
pub fn lookup_ticket(db: &sled::Db, ticket_number: &str) -> Result<Ticket, AppError> {
    let ticket = match ticket_number.trim().parse::<u32>() {
        Ok(number) => db.get_ticket(number)?,
        Err(_) => None,
    };
    ticket.ok_or_else(|| AppError::NotFound("No such ticket was found.".to_owned()))
}
