//! A010/A011: the command protocols.
//!
//! A command is a single packet whose payload is a 16-bit opcode.  Two
//! opcode tables exist; which one a device uses is part of the negotiated
//! protocol set.  A011 is the small table spoken by a handful of panel
//! units; everything else speaks A010.

use crate::packet::{pid, Packet};

/// The transfer triggers, named independently of the opcode tables.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Command {
    AbortTransfer,
    TransferAlm,
    TransferPosn,
    TransferPrx,
    TransferRte,
    TransferTime,
    TransferTrk,
    TransferWpt,
    TurnOffPwr,
    TransferUnitId,
    StartPvtData,
    StopPvtData,
    FlightRecords,
    TransferLaps,
    TransferRuns,
    TransferWorkouts,
    TransferCourses,
    TransferCoursePoints,
}

/// Which opcode table the device negotiated.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CommandProto {
    A010,
    A011,
}

impl CommandProto {
    /// The packet id command packets travel under.
    pub fn packet_id(self) -> u16 {
        match self {
            CommandProto::A010 => pid::COMMAND_A010,
            CommandProto::A011 => pid::COMMAND_A011,
        }
    }

    /// Look up the opcode, or `None` if this table has no entry for the
    /// command.
    pub fn opcode(self, cmd: Command) -> Option<u16> {
        use Command::*;
        match self {
            CommandProto::A010 => Some(match cmd {
                AbortTransfer => 0,
                TransferAlm => 1,
                TransferPosn => 2,
                TransferPrx => 3,
                TransferRte => 4,
                TransferTime => 5,
                TransferTrk => 6,
                TransferWpt => 7,
                TurnOffPwr => 8,
                TransferUnitId => 14,
                StartPvtData => 49,
                StopPvtData => 50,
                FlightRecords => 92,
                TransferLaps => 117,
                TransferRuns => 450,
                TransferWorkouts => 451,
                TransferCourses => 561,
                TransferCoursePoints => 563,
            }),
            CommandProto::A011 => match cmd {
                AbortTransfer => Some(0),
                TransferAlm => Some(4),
                TransferRte => Some(8),
                TransferPrx => Some(17),
                TransferTime => Some(20),
                TransferWpt => Some(21),
                TurnOffPwr => Some(26),
                _ => None,
            },
        }
    }

    /// Build the command packet.
    pub fn packet(self, cmd: Command) -> Option<Packet> {
        Some(Packet::with_u16(self.packet_id(), self.opcode(cmd)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a010_wraps_the_opcode() {
        let pkt = CommandProto::A010.packet(Command::TransferWpt).unwrap();
        assert_eq!(pkt.id, pid::COMMAND_A010);
        assert_eq!(&pkt.data[..], &[7, 0]);
    }

    #[test]
    fn a011_disagrees_about_opcodes() {
        assert_eq!(CommandProto::A011.opcode(Command::TransferWpt), Some(21));
        assert_eq!(CommandProto::A011.packet_id(), pid::COMMAND_A011);
    }

    #[test]
    fn a011_has_no_fitness_era_entries() {
        assert_eq!(CommandProto::A011.opcode(Command::TransferRuns), None);
        assert_eq!(CommandProto::A011.opcode(Command::StartPvtData), None);
    }
}
