// Server-generated event names that the streaming layer itself emits.
// Application events published through the hub use their own names.

// first frame on every connection
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
