use crate::room::RoomResolver;
use crate::users::UserResolver;
use crate::utils::normalize_channel;
use crate::{Role, ServiceError, StaffReport};
use std::collections::HashSet;
use tracing::info;

/// Roles scanned for staff accounts, in scan order
const SCANNED_ROLES: [Role; 4] = [Role::Broadcaster, Role::Moderator, Role::Vip, Role::Viewer];

/// Combines the room and user resolvers into a per-room staff listing
#[derive(Clone)]
pub struct StaffLookup {
    rooms: RoomResolver,
    users: UserResolver,
}

impl StaffLookup {
    pub fn new(rooms: RoomResolver, users: UserResolver) -> Self {
        Self { rooms, users }
    }

    pub async fn lookup_staff(&self, channel: &str) -> Result<StaffReport, ServiceError> {
        let channel = normalize_channel(channel)?;
        let room = self.rooms.resolve(&channel).await?;

        if room.chatter_count == 0 {
            return Ok(StaffReport {
                channel,
                staff: Vec::new(),
                chatter_count: 0,
            });
        }

        // Duplicates are kept; the user resolver handles repeats
        let usernames: Vec<String> = SCANNED_ROLES
            .iter()
            .flat_map(|role| room.chatters.get(*role).iter().cloned())
            .collect();

        info!(
            "Received a list of {} chatters in #{}",
            usernames.len(),
            channel
        );

        // A repeated chatter may come back once or once per repeat depending on
        // what was cached, so each staff login is reported once
        let mut seen = HashSet::new();
        let staff = self
            .users
            .resolve(&usernames)
            .await?
            .into_iter()
            .filter(|user| user.is_staff())
            .map(|user| user.login)
            .filter(|login| seen.insert(login.clone()))
            .collect();

        Ok(StaffReport {
            channel,
            staff,
            chatter_count: room.chatter_count,
        })
    }
}
