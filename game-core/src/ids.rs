use game_types::GameId;
use rand::Rng;

/// Alphabet without easily-confused characters (0/O, 1/I/l).
const ID_ALPHABET: &[u8] = b"abcdefghjkmnpqrstuvwxyz23456789";
const ID_LENGTH: usize = 6;

/// Short, human-typeable random game id. Collision avoidance is
/// probabilistic only - sessions are low-cardinality and local.
pub fn new_game_id() -> GameId {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}
