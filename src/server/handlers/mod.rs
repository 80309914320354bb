pub mod emergency;
pub mod feed;
pub mod offers;
pub mod ratings;
pub mod tags;
pub mod trips;
pub mod users;

use serde::Deserialize;

use crate::entities::Role;

#[derive(Deserialize)]
pub struct RoleQuery {
    role: Option<Role>,
}

impl RoleQuery {
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::Passenger)
    }
}
