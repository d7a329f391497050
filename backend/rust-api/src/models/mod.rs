pub mod quiz;

pub use quiz::{
    AnswerSet, CompleteQuizRequest, CreateQuizRequest, CreateQuizResponse, HistoryQuery,
    HistoryResponse, Level, Owner, ProgressAck, Question, QuizSession, QuizSessionResponse,
    QuizStatus, RawQuestion, ResumeQuery, SaveProgressRequest,
};
