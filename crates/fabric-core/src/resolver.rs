use crate::{member::MemberSet, message::Message, token::Token};

/// Chooses destination member(s) for an outbound message from a token
/// computed against the service's ring (§4.2).
///
/// Both variants are consistent-hash lookups on the same sorted ring; they
/// differ only in which bytes of the message feed the token. Resolvers are
/// tagged alternatives rather than an open trait hierarchy, matching the
/// fixed four-link chain the fabric commits to.
#[derive(Debug, Clone)]
pub enum Resolver {
    /// Token := CRC32(message.path).
    Path { count: usize },
    /// Token := CRC32(first captured group of the binding's path regex
    /// against message.path); falls back to token 0 when the binding has no
    /// capture group.
    Param { count: usize },
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::Path { count: 1 }
    }
}

impl Resolver {
    /// Resolve the destination ring members for `message`, given the
    /// already-extracted first capture (only consulted by `Param`).
    ///
    /// A no-op when the message already carries an explicit, non-empty
    /// destination: the caller's choice is honoured.
    pub fn resolve(&self, message: &mut Message, members: &MemberSet, first_capture: Option<&str>) {
        if !message.is_destination_empty() {
            return;
        }

        let (token, count) = match self {
            Resolver::Path { count } => (Token::hash(&message.path), *count),
            Resolver::Param { count } => {
                let token = match first_capture {
                    Some(value) => Token::hash(value),
                    None => Token(0),
                };
                (token, *count)
            }
        };

        message.destination = members.resolve(token, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{member::Member, node::Node};

    fn ring() -> MemberSet {
        let mut set = MemberSet::new();
        set.add(Member::new(Token(0), Node::new("a", 1, 2)));
        set.add(Member::new(Token(0x8000_0000), Node::new("b", 1, 2)));
        set
    }

    #[test]
    fn path_resolver_hashes_the_message_path() {
        let resolver = Resolver::Path { count: 1 };
        let mut message = Message::new("s", "/alpha");
        resolver.resolve(&mut message, &ring(), None);
        assert_eq!(message.destination.len(), 1);
    }

    #[test]
    fn param_resolver_without_capture_uses_token_zero() {
        let resolver = Resolver::Param { count: 1 };
        let mut message = Message::new("s", "/user//tl");
        resolver.resolve(&mut message, &ring(), None);
        assert_eq!(message.destination.get(0).unwrap().node.address, "a");
    }

    #[test]
    fn explicit_destination_is_left_untouched() {
        let resolver = Resolver::Path { count: 1 };
        let mut message = Message::new("s", "/alpha");
        message.destination = ring().resolve(Token(0x8000_0000), 1);
        let before = message.destination.clone();

        resolver.resolve(&mut message, &ring(), None);
        assert_eq!(message.destination, before);
    }
}
