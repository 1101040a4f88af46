use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Ticket {
    pub ticket_number: u32,
    pub cinema: String,
    pub seat: String,
    pub showtime: String,
    pub film: String,
    pub username: String,
}

/// Validated purchase input, before a ticket number is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub cinema: String,
    pub seat: String,
    pub showtime: String,
    pub film: String,
}

impl NewTicket {
    pub fn issue(self, ticket_number: u32, username: &str) -> Ticket {
        Ticket {
            ticket_number,
            cinema: self.cinema,
            seat: self.seat,
            showtime: self.showtime,
            film: self.film,
            username: username.to_owned(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Film {
    pub title: String,
    pub year: u16,
    pub description: String,
}
