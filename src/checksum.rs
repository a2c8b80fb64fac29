/// XOR of every byte in `data`.
///
/// Called with a frame from its sync byte through the last payload byte, this is
/// the value the checksum byte must hold.
pub(crate) fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}
