pub type Identifier = String;
pub type TableName = Identifier;
pub type ColumnName = Identifier;

/// One parsed statement.
///
/// `EXPECTS` and `ATTACH` only contribute to the document's meta section;
/// everything else becomes an [`Action`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Expects {
        table: TableName,
        columns: Vec<ColumnName>,
    },
    Attach {
        url: String,
        name: Identifier,
    },
    Action(Action),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Push {
        table: TableName,
    },
    Pop,
    Duplicate,
    Commit {
        table: TableName,
        columns: Option<Vec<ColumnName>>,
    },
    Join(Joinish),
    Inclusion(Joinish),
    Accumulate {
        column: ColumnName,
        function: Function,
        result: Option<ColumnName>,
    },
    Pull(Pull),
    Invoke(Invoke),
    /// An action name outside the known set, kept so that documents written
    /// for newer versions of the language still load.
    Unrecognized {
        name: String,
    },
}

impl Action {
    /// The `name` field of this action in the canonical document.
    pub fn name(&self) -> &str {
        match self {
            Action::Push { .. } => "push",
            Action::Pop => "pop",
            Action::Duplicate => "duplicate",
            Action::Commit { .. } => "commit",
            Action::Join(_) => "join",
            Action::Inclusion(_) => "inclusion",
            Action::Accumulate { .. } => "accumulate",
            Action::Pull(_) => "pull",
            Action::Invoke(_) => "invoke",
            Action::Unrecognized { name } => name,
        }
    }
}

/// Shared shape of `JOIN` and `INCLUSION`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Joinish {
    pub using: Using,
    pub include: Vec<ColumnProjection>,
}

/// Index-aligned key columns of the left and right frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Using {
    pub left: Vec<ColumnName>,
    pub right: Vec<ColumnName>,
}

impl Using {
    /// Key columns paired by position. Callers check that both sides have the
    /// same length first.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.left
            .iter()
            .zip(&self.right)
            .map(|(l, r)| (l.as_str(), r.as_str()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnProjection {
    pub src: ColumnName,
    pub dst: ColumnName,
}

impl ColumnProjection {
    pub fn new(src: impl Into<ColumnName>, dst: impl Into<ColumnName>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
        }
    }

    pub fn same(name: impl Into<ColumnName>) -> Self {
        let name = name.into();
        Self {
            src: name.clone(),
            dst: name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: Identifier,
    pub args: Vec<ColumnName>,
}

/// `PULL namespace:table:version AS as_name`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pull {
    pub namespace: Identifier,
    pub table: TableName,
    pub version: Identifier,
    pub as_name: TableName,
}

/// `INVOKE namespace:rule:version`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invoke {
    pub namespace: Identifier,
    pub rule: Identifier,
    pub version: Identifier,
}
