pub mod computer;
pub mod connector;

pub use computer::{
    FieldHashPartitionComputer, FieldHashPartitionComputerFactory, PartitionComputerFactory,
    RangePartitionComputer, RangePartitionComputerFactory, RoundRobinPartitionComputer,
    RoundRobinPartitionComputerFactory, TuplePartitionComputer, reduce,
};
pub use connector::PartitionDataWriter;
