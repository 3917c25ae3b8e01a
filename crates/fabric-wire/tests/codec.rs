use fabric_core::{
    data::Value,
    member::Member,
    message::Message,
    node::Node,
    token::Token,
};
use fabric_wire::codec;

#[test]
fn a_fanout_destination_round_trips_in_order() {
    let mut message = Message::new("directory", "/lookup/alice");
    message.destination.add(Member::new(Token(1), Node::new("10.0.0.1", 4000, 4001)));
    message.destination.add(Member::new(Token(2), Node::new("10.0.0.2", 4000, 4001)));
    message.destination.add(Member::new(Token(3), Node::new("10.0.0.3", 4000, 4001)));

    let decoded = codec::decode(&codec::encode(&message)).unwrap();

    let addrs: Vec<&str> = decoded.destination.iter().map(|m| m.node.address.as_str()).collect();
    assert_eq!(addrs, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
}

#[test]
fn an_error_reply_round_trips_its_code_and_message() {
    let message = Message::new("directory", "/lookup/alice").with_error(fabric_core::message::MessageError::not_found());

    let decoded = codec::decode(&codec::encode(&message)).unwrap();

    assert!(decoded.is_error());
    assert_eq!(decoded.error.code, fabric_core::message::ERROR_NOT_FOUND);
}

#[test]
fn a_stream_of_two_frames_is_individually_addressable_via_peek_frame_len() {
    let first = codec::encode(&Message::new("svc", "/a"));
    let second = codec::encode(&Message::new("svc", "/bb"));

    let mut stream = Vec::new();
    stream.extend_from_slice(&first);
    stream.extend_from_slice(&second);

    let first_len = codec::peek_frame_len(&stream).unwrap();
    assert_eq!(first_len, first.len());

    let decoded_first = codec::decode(&stream[..first_len]).unwrap();
    let decoded_second = codec::decode(&stream[first_len..]).unwrap();
    assert_eq!(decoded_first.path, "/a");
    assert_eq!(decoded_second.path, "/bb");
}

#[test]
fn deeply_nested_data_values_survive_the_round_trip() {
    let mut message = Message::new("svc", "/tree");
    message.data.insert(
        "root".into(),
        Value::List(vec![Value::Map({
            let mut inner = fabric_core::data::data();
            inner.insert("leaf".into(), Value::Int(-7));
            inner
        })]),
    );

    let decoded = codec::decode(&codec::encode(&message)).unwrap();
    let list = decoded.data.get("root").unwrap().as_list().unwrap();
    let leaf = list[0].as_map().unwrap().get("leaf").unwrap();
    assert_eq!(leaf.as_int(), Some(-7));
}
