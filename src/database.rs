use crate::model::*;
use sled::transaction::{abort, TransactionError, Transactional};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("email address is already registered")]
    EmailTaken,
    #[error("username is already registered")]
    UsernameTaken,
    #[error("ticket number {0} is already taken")]
    TicketNumberTaken(u32),
}

pub type DbResult<T> = Result<T, DbError>;

fn serialize_id(id: u64) -> [u8; 8] {
    id.to_le_bytes()
}

fn deserialize_id<V: AsRef<[u8]>>(id: V) -> Option<u64> {
    id.as_ref().try_into().ok().map(u64::from_le_bytes)
}

// Big endian so that the tickets tree iterates in numeric order.
fn ticket_key(ticket_number: u32) -> [u8; 4] {
    ticket_number.to_be_bytes()
}

pub(crate) const USERS: &[u8] = b"users";
pub(crate) const USERS_USERNAME: &[u8] = b"users_username";
pub(crate) const USERS_EMAIL: &[u8] = b"users_email";
pub(crate) const TICKETS: &[u8] = b"tickets";
pub(crate) const FILMS: &[u8] = b"films";

pub trait UserDb {
    /// Stores a new user, keeping username and email unique.
    fn add_user(&self, user: &User) -> DbResult<u64>;
    fn get_user(&self, id: u64) -> DbResult<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> DbResult<Option<(u64, User)>>;
    fn get_user_by_email(&self, email: &str) -> DbResult<Option<(u64, User)>>;
}

impl UserDb for sled::Db {
    fn add_user(&self, user: &User) -> DbResult<u64> {
        let users = self.open_tree(USERS)?;
        let users_username = self.open_tree(USERS_USERNAME)?;
        let users_email = self.open_tree(USERS_EMAIL)?;
        let id = self.generate_id()?;
        let encoded = bincode::serialize(user)?;
        let result = (&users, &users_username, &users_email).transaction(
            |(users, users_username, users_email)| {
                if users_email.get(user.email.as_bytes())?.is_some() {
                    return abort(DbError::EmailTaken);
                }
                if users_username.get(user.username.as_bytes())?.is_some() {
                    return abort(DbError::UsernameTaken);
                }
                users.insert(&serialize_id(id), encoded.as_slice())?;
                users_username.insert(user.username.as_bytes(), &serialize_id(id))?;
                users_email.insert(user.email.as_bytes(), &serialize_id(id))?;
                Ok(())
            },
        );
        match result {
            Ok(()) => Ok(id),
            Err(TransactionError::Abort(err)) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn get_user(&self, id: u64) -> DbResult<Option<User>> {
        let users = self.open_tree(USERS)?;
        match users.get(serialize_id(id))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn get_user_by_username(&self, username: &str) -> DbResult<Option<(u64, User)>> {
        lookup_by_index(self, USERS_USERNAME, username)
    }

    fn get_user_by_email(&self, email: &str) -> DbResult<Option<(u64, User)>> {
        lookup_by_index(self, USERS_EMAIL, email)
    }
}

fn lookup_by_index(db: &sled::Db, index: &[u8], key: &str) -> DbResult<Option<(u64, User)>> {
    let index = db.open_tree(index)?;
    let id = match index.get(key.as_bytes())?.and_then(deserialize_id) {
        Some(id) => id,
        None => return Ok(None),
    };
    match db.get_user(id)? {
        Some(user) => Ok(Some((id, user))),
        None => {
            log::warn!("Dangling user index entry for id {}", id);
            Ok(None)
        }
    }
}

pub trait TicketDb {
    /// Stores a ticket under its number. Never overwrites an existing ticket.
    fn add_ticket(&self, ticket: &Ticket) -> DbResult<()>;
    fn get_ticket(&self, ticket_number: u32) -> DbResult<Option<Ticket>>;
    fn tickets_for_user(&self, username: &str) -> DbResult<Vec<Ticket>>;
}

impl TicketDb for sled::Db {
    fn add_ticket(&self, ticket: &Ticket) -> DbResult<()> {
        let tickets = self.open_tree(TICKETS)?;
        let encoded = bincode::serialize(ticket)?;
        match tickets.compare_and_swap(
            ticket_key(ticket.ticket_number),
            None as Option<&[u8]>,
            Some(encoded),
        )? {
            Ok(()) => Ok(()),
            Err(_) => Err(DbError::TicketNumberTaken(ticket.ticket_number)),
        }
    }

    fn get_ticket(&self, ticket_number: u32) -> DbResult<Option<Ticket>> {
        let tickets = self.open_tree(TICKETS)?;
        match tickets.get(ticket_key(ticket_number))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    fn tickets_for_user(&self, username: &str) -> DbResult<Vec<Ticket>> {
        let tickets = self.open_tree(TICKETS)?;
        let mut owned = Vec::new();
        for entry in tickets.iter() {
            let (_key, data) = entry?;
            let ticket: Ticket = bincode::deserialize(&data)?;
            if ticket.username == username {
                owned.push(ticket);
            }
        }
        Ok(owned)
    }
}

pub trait FilmDb {
    fn add_film(&self, film: &Film) -> DbResult<u64>;
    fn films(&self) -> DbResult<Vec<(u64, Film)>>;
}

impl FilmDb for sled::Db {
    fn add_film(&self, film: &Film) -> DbResult<u64> {
        let films = self.open_tree(FILMS)?;
        let id = self.generate_id()?;
        films.insert(serialize_id(id), bincode::serialize(film)?)?;
        Ok(id)
    }

    fn films(&self) -> DbResult<Vec<(u64, Film)>> {
        let films = self.open_tree(FILMS)?;
        let mut ret = Vec::new();
        for entry in films.iter() {
            let (key, data) = entry?;
            if let Some(id) = deserialize_id(&key) {
                ret.push((id, bincode::deserialize(&data)?));
            }
        }
        Ok(ret)
    }
}

/// Fills an empty film catalog with the default programme.
pub fn seed_films(db: &sled::Db) -> DbResult<usize> {
    if !db.open_tree(FILMS)?.is_empty() {
        return Ok(0);
    }
    let programme = [
        ("Dune", 2021, "Paul Atreides travels to the desert planet Arrakis."),
        ("Pulp Fiction", 1994, "Intertwined stories of crime in Los Angeles."),
        ("Interstellar", 2014, "A team of explorers travels through a wormhole."),
        ("The Matrix", 1999, "A hacker learns the truth about his reality."),
        ("Spirited Away", 2001, "A girl wanders into a world of spirits."),
    ];
    for (title, year, description) in programme.iter() {
        db.add_film(&Film {
            title: (*title).to_owned(),
            year: *year,
            description: (*description).to_owned(),
        })?;
    }
    Ok(programme.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temporary() -> sled::Db {
        sled::Config::new().temporary(true).open().unwrap()
    }

    fn user(username: &str, email: &str) -> User {
        User {
            username: username.to_owned(),
            email: email.to_owned(),
            password_hash: "$2b$04$not-a-real-hash".to_owned(),
        }
    }

    fn ticket(ticket_number: u32, username: &str) -> Ticket {
        Ticket {
            ticket_number,
            cinema: "CinemaX".to_owned(),
            seat: "A1".to_owned(),
            showtime: "18:00".to_owned(),
            film: "Dune".to_owned(),
            username: username.to_owned(),
        }
    }

    #[test]
    fn users_are_indexed_by_username_and_email() {
        let db = temporary();
        let id = db.add_user(&user("alice", "a@x.com")).unwrap();
        let (by_name, alice) = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name, id);
        assert_eq!(alice.email, "a@x.com");
        let (by_email, _) = db.get_user_by_email("a@x.com").unwrap().unwrap();
        assert_eq!(by_email, id);
        assert_eq!(db.get_user(id).unwrap(), Some(alice));
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = temporary();
        db.add_user(&user("alice", "a@x.com")).unwrap();
        let err = db.add_user(&user("alicia", "a@x.com")).unwrap_err();
        assert!(matches!(err, DbError::EmailTaken));
        assert_eq!(db.open_tree(USERS).unwrap().len(), 1);
        assert!(db.get_user_by_username("alicia").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = temporary();
        db.add_user(&user("alice", "a@x.com")).unwrap();
        let err = db.add_user(&user("alice", "other@x.com")).unwrap_err();
        assert!(matches!(err, DbError::UsernameTaken));
        assert!(db.get_user_by_email("other@x.com").unwrap().is_none());
    }

    #[test]
    fn taken_ticket_number_is_not_overwritten() {
        let db = temporary();
        db.add_ticket(&ticket(123456, "alice")).unwrap();
        let err = db.add_ticket(&ticket(123456, "bob")).unwrap_err();
        assert!(matches!(err, DbError::TicketNumberTaken(123456)));
        assert_eq!(db.get_ticket(123456).unwrap().unwrap().username, "alice");
    }

    #[test]
    fn tickets_are_listed_per_owner() {
        let db = temporary();
        db.add_ticket(&ticket(500000, "alice")).unwrap();
        db.add_ticket(&ticket(200000, "bob")).unwrap();
        db.add_ticket(&ticket(100001, "alice")).unwrap();
        let numbers = db
            .tickets_for_user("alice")
            .unwrap()
            .into_iter()
            .map(|t| t.ticket_number)
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![100001, 500000]);
        assert!(db.get_ticket(999999).unwrap().is_none());
    }

    #[test]
    fn films_are_seeded_once() {
        let db = temporary();
        assert_eq!(seed_films(&db).unwrap(), 5);
        assert_eq!(seed_films(&db).unwrap(), 0);
        let films = db.films().unwrap();
        assert_eq!(films.len(), 5);
        assert!(films.iter().any(|(_, film)| film.title == "Dune"));
    }
}
