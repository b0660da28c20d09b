// Wire messages exchanged between the command store and its consumers.
// Declared with prost derives so no protoc step is needed at build time.

pub mod command {
    use serde::Serialize;

    /// Lifecycle status as carried on the wire.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize)]
    #[repr(i32)]
    pub enum Status {
        Unspecified = 0,
        Pending = 1,
        Running = 2,
        Success = 3,
        Error = 4,
    }

    /// Change notification emitted after every persisted write to a command record.
    #[derive(Clone, PartialEq, prost::Message, Serialize)]
    pub struct CommandChanged {
        #[prost(string, tag = "1")]
        pub command_id: String,
        #[prost(enumeration = "Status", tag = "2")]
        pub status: i32,
        #[prost(string, optional, tag = "3")]
        pub tenant_id: Option<String>,
        #[prost(string, tag = "4")]
        pub command_type: String,
        #[prost(string, tag = "5")]
        pub changed_at: String,
    }

    /// Event type names used as the message type header.
    pub const COMMAND_CREATED: &str = "CommandCreated";
    pub const COMMAND_STATUS_CHANGED: &str = "CommandStatusChanged";
}

#[cfg(test)]
mod tests {
    use super::command::{CommandChanged, Status};
    use prost::Message;

    #[test]
    fn command_changed_decodes_what_it_encodes() {
        let msg = CommandChanged {
            command_id: "c-1".into(),
            status: Status::Pending as i32,
            tenant_id: Some("t-1".into()),
            command_type: "HEALTH_CHECK".into(),
            changed_at: "2025-01-01T00:00:00Z".into(),
        };
        let bytes = msg.encode_to_vec();
        let decoded = CommandChanged::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.status(), Status::Pending);
    }
}
