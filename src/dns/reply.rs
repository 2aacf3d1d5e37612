//! Reply construction for answers the daemon produces itself.

use hickory_proto::op::{Message, MessageType, ResponseCode};

/// An empty reply mirroring the query's ID, opcode, RD flag and questions.
///
/// Sent when the upstream cannot be reached, so the client gets an answer
/// instead of timing out.
pub fn reply_to(query: &Message) -> Message {
    let mut response = Message::new();
    response
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_recursion_desired(query.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);

    for q in query.queries() {
        response.add_query(q.clone());
    }

    response
}

/// A `REFUSED` reply for a blocked query.
pub fn refused(query: &Message) -> Message {
    let mut response = reply_to(query);
    response.set_response_code(ResponseCode::Refused);
    response
}
